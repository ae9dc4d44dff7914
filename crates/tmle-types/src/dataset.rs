//! Feature matrix plus parallel label vector.

use ndarray::{Array2, Axis};
use std::collections::BTreeMap;

use crate::errors::{DataError, TmleResult};

/// A labelled dataset: one feature row per label.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<L> {
    features: Array2<f64>,
    labels: Vec<L>,
}

impl<L: Clone> Dataset<L> {
    /// Pair a feature matrix with its labels.
    ///
    /// Fails when there are no samples or the number of rows differs from
    /// the number of labels.
    pub fn new(features: Array2<f64>, labels: Vec<L>) -> TmleResult<Self> {
        if labels.is_empty() && features.nrows() == 0 {
            return Err(DataError::Empty.into());
        }
        if features.nrows() != labels.len() {
            return Err(DataError::ShapeMismatch {
                rows: features.nrows(),
                labels: labels.len(),
            }
            .into());
        }
        Ok(Self { features, labels })
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[L] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Gather the rows and labels at `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> TmleResult<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index,
                len: self.len(),
            }
            .into());
        }
        Ok(Self {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
        })
    }
}

impl<L: Clone + Ord> Dataset<L> {
    /// Number of samples per class, in sorted label order.
    pub fn class_counts(&self) -> BTreeMap<L, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }
}
