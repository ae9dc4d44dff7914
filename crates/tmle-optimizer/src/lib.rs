//! # tmle-optimizer
//!
//! Cross-validated hyperparameter search for tmle classifiers.
//!
//! Provides search space definitions, search strategies (TPE, random, grid),
//! a sequential minimization loop with trial tracking, a stratified k-fold
//! splitter, and [`ClassifierOptimizer`], which ties them to a
//! [`tmle_types::Classifier`] and a scoring metric.

mod config;
mod fmin;
mod search;
mod selection;
mod split;
mod tpe;
mod trial;

pub use config::{SearchAlgorithm, SearchConfig};
pub use fmin::{Fmin, Objective, Optimizer};
pub use search::{
    GridSearch, ParameterDef, ParameterKind, RandomSearch, SearchSpace, SearchStrategy,
};
pub use selection::{ClassifierOptimizer, SearchOutcome};
pub use split::{Fold, Splitter, StratifiedKFold};
pub use tpe::{TpeConfig, TpeSearch};
pub use trial::{
    FoldScore, ObjectiveDirection, ResultStatus, Score, SearchId, Trial, TrialResult, TrialStatus,
    Trials,
};
