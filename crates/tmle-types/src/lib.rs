//! # tmle-types
//!
//! Core types shared by the tmle crates: the error taxonomy, labelled
//! datasets, named parameter values, the [`Classifier`] capability, scoring
//! metrics and two reference classifiers.

pub mod classifiers;
pub mod dataset;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod params;

pub use classifiers::{KNearestNeighbors, KnnConfig, MajorityClassifier, WeightScheme};
pub use dataset::Dataset;
pub use errors::*;
pub use model::Classifier;
pub use params::{format_params, ParameterValue, Params};
