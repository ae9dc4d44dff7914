use thiserror::Error;

/// Main error type for tmle
#[derive(Error, Debug)]
pub enum TmleError {
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while binding named parameters onto a model
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Unknown parameter: {name}")]
    Unknown { name: String },

    #[error("Invalid type for parameter {name}: expected {expected}")]
    InvalidType { name: String, expected: String },

    #[error("Parameter {name} out of range: {message}")]
    OutOfRange { name: String, message: String },
}

/// Dataset shape errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Feature matrix has {rows} rows but {labels} labels were given")]
    ShapeMismatch { rows: usize, labels: usize },

    #[error("Dataset is empty")]
    Empty,

    #[error("Sample index {index} out of bounds for dataset of {len} samples")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Errors raised by a classifier while training or predicting
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Training failed: {message}")]
    Training { message: String },

    #[error("Prediction failed: {message}")]
    Prediction { message: String },
}

/// Cross-validation splitting errors
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("n_splits must be at least 2, got {n_splits}")]
    TooFewSplits { n_splits: usize },

    #[error("Cannot have n_splits={n_splits} greater than the number of samples: {n_samples}")]
    TooFewSamples { n_splits: usize, n_samples: usize },

    #[error("Class {class} has only {members} members, which is less than n_splits={n_splits}")]
    ClassTooSmall {
        class: String,
        members: usize,
        n_splits: usize,
    },
}

/// Errors raised by the search loop and search space
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid search space: {message}")]
    InvalidSpace { message: String },

    #[error("No successful trials after {attempted} evaluations")]
    NoSuccessfulTrials { attempted: usize },

    #[error("Invalid search configuration: {message}")]
    InvalidConfig { message: String },
}

/// Result type alias for tmle operations
pub type TmleResult<T> = Result<T, TmleError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TmleError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TmleError::Config(format!($($arg)*))
    };
}
