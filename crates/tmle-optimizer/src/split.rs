//! Cross-validation splitters.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tmle_types::{SplitError, TmleResult};

use crate::search::seeded_rng;

/// One train/validation partition of the sample indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Produces disjoint folds that together cover every sample index.
pub trait Splitter<L> {
    fn split(&self, labels: &[L]) -> TmleResult<Vec<Fold>>;
}

/// Stratified k-fold: each fold keeps roughly the class proportions of the
/// full label set.
///
/// Without shuffling the folds are fully determined by the label order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            seed: None,
        }
    }

    pub fn with_shuffle(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }
}

impl<L: PartialEq + std::fmt::Debug> Splitter<L> for StratifiedKFold {
    fn split(&self, labels: &[L]) -> TmleResult<Vec<Fold>> {
        let n_splits = self.n_splits;
        let n_samples = labels.len();
        if n_splits < 2 {
            return Err(SplitError::TooFewSplits { n_splits }.into());
        }
        if n_samples < n_splits {
            return Err(SplitError::TooFewSamples {
                n_splits,
                n_samples,
            }
            .into());
        }

        // Encode classes in order of first appearance.
        let mut classes: Vec<&L> = Vec::new();
        let mut encoded = Vec::with_capacity(n_samples);
        for label in labels {
            let code = match classes.iter().position(|c| *c == label) {
                Some(code) => code,
                None => {
                    classes.push(label);
                    classes.len() - 1
                }
            };
            encoded.push(code);
        }

        let mut counts = vec![0usize; classes.len()];
        for &code in &encoded {
            counts[code] += 1;
        }
        if let Some((code, &members)) = counts.iter().enumerate().find(|(_, &c)| c < n_splits) {
            return Err(SplitError::ClassTooSmall {
                class: format!("{:?}", classes[code]),
                members,
                n_splits,
            }
            .into());
        }

        // Deal the class-sorted samples round-robin to get per-fold counts.
        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; classes.len()]; n_splits];
        for (position, &code) in sorted.iter().enumerate() {
            allocation[position % n_splits][code] += 1;
        }

        let mut rng = self.shuffle.then(|| seeded_rng(self.seed));
        let mut test_fold = vec![0usize; n_samples];
        for code in 0..classes.len() {
            let mut fold_ids: Vec<usize> = (0..n_splits)
                .flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][code]))
                .collect();
            if let Some(rng) = rng.as_mut() {
                fold_ids.shuffle(rng);
            }
            let members = encoded
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == code)
                .map(|(i, _)| i);
            for (sample, fold) in members.zip(fold_ids) {
                test_fold[sample] = fold;
            }
        }

        let folds: Vec<Fold> = (0..n_splits)
            .map(|index| {
                let (valid, train): (Vec<usize>, Vec<usize>) =
                    (0..n_samples).partition(|&i| test_fold[i] == index);
                Fold {
                    index,
                    train,
                    valid,
                }
            })
            .collect();

        debug!(
            "Stratified {}-fold split over {} samples and {} classes",
            n_splits,
            n_samples,
            classes.len()
        );
        Ok(folds)
    }
}
