//! The classifier capability the search driver tunes.

use ndarray::Array2;

use crate::errors::TmleResult;
use crate::params::Params;

/// A trainable, configurable classifier.
///
/// Implementations bind named parameters onto their own settings in
/// [`Classifier::set_params`] and must reject names they do not recognise
/// without touching the rest of their configuration.
pub trait Classifier {
    type Label: Clone;

    /// Apply named parameter overrides in place.
    fn set_params(&mut self, params: &Params) -> TmleResult<()>;

    /// Current configuration as named parameters.
    fn get_params(&self) -> Params;

    /// Train on `x` (one row per sample) and the parallel labels `y`.
    fn fit(&mut self, x: &Array2<f64>, y: &[Self::Label]) -> TmleResult<()>;

    /// Predict one label per row of `x`.
    fn predict(&self, x: &Array2<f64>) -> TmleResult<Vec<Self::Label>>;
}
