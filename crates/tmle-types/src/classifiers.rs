//! Reference classifiers implementing [`Classifier`].

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::{ModelError, ParamError, TmleResult};
use crate::model::Classifier;
use crate::params::{ParameterValue, Params};

/// Most frequent label among `labels` with the given weights; ties go to the
/// smallest label.
fn weighted_vote<'a, L, I>(votes: I) -> Option<L>
where
    L: Ord + Clone + 'a,
    I: IntoIterator<Item = (&'a L, f64)>,
{
    let mut tally: BTreeMap<&L, f64> = BTreeMap::new();
    for (label, weight) in votes {
        *tally.entry(label).or_insert(0.0) += weight;
    }
    // BTreeMap yields labels in ascending order and only a strictly larger
    // weight replaces the leader, so the smallest tied label wins.
    let mut best: Option<(&L, f64)> = None;
    for (label, weight) in tally {
        match best {
            Some((_, w)) if weight <= w => {}
            _ => best = Some((label, weight)),
        }
    }
    best.map(|(label, _)| label.clone())
}

/// Always predicts the most frequent label of its training data.
#[derive(Debug, Clone, Default)]
pub struct MajorityClassifier<L> {
    majority: Option<L>,
}

impl<L> MajorityClassifier<L> {
    pub fn new() -> Self {
        Self { majority: None }
    }

    pub fn majority(&self) -> Option<&L> {
        self.majority.as_ref()
    }
}

impl<L: Ord + Clone> Classifier for MajorityClassifier<L> {
    type Label = L;

    fn set_params(&mut self, params: &Params) -> TmleResult<()> {
        match params.keys().min() {
            Some(name) => Err(ParamError::Unknown { name: name.clone() }.into()),
            None => Ok(()),
        }
    }

    fn get_params(&self) -> Params {
        Params::new()
    }

    fn fit(&mut self, _x: &Array2<f64>, y: &[L]) -> TmleResult<()> {
        let majority = weighted_vote(y.iter().map(|label| (label, 1.0))).ok_or_else(|| {
            ModelError::Training {
                message: "cannot fit on an empty label set".to_string(),
            }
        })?;
        self.majority = Some(majority);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> TmleResult<Vec<L>> {
        let majority = self.majority.as_ref().ok_or(ModelError::NotFitted)?;
        Ok(vec![majority.clone(); x.nrows()])
    }
}

/// Weighting scheme for neighbour votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// All neighbours have equal weight
    Uniform,
    /// Closer neighbours have more weight (inverse distance)
    Distance,
}

impl WeightScheme {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Distance => "distance",
        }
    }
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Uniform
    }
}

/// Settings bound by [`KNearestNeighbors::set_params`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnConfig {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: WeightScheme::Uniform,
        }
    }
}

impl KnnConfig {
    /// Apply one named override.
    fn bind(&mut self, name: &str, value: &ParameterValue) -> Result<(), ParamError> {
        match name {
            "n_neighbors" => {
                let k = value.expect_i64(name)?;
                if k < 1 {
                    return Err(ParamError::OutOfRange {
                        name: name.to_string(),
                        message: format!("must be >= 1, got {k}"),
                    });
                }
                self.n_neighbors = k as usize;
            }
            "weights" => {
                self.weights = match value.expect_str(name)? {
                    "uniform" => WeightScheme::Uniform,
                    "distance" => WeightScheme::Distance,
                    other => {
                        return Err(ParamError::OutOfRange {
                            name: name.to_string(),
                            message: format!("expected \"uniform\" or \"distance\", got {other:?}"),
                        })
                    }
                };
            }
            _ => {
                return Err(ParamError::Unknown {
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// K-nearest-neighbours classifier over Euclidean distance.
#[derive(Debug, Clone)]
pub struct KNearestNeighbors<L> {
    config: KnnConfig,
    x_train: Option<Array2<f64>>,
    y_train: Vec<L>,
}

impl<L> KNearestNeighbors<L> {
    pub fn new(config: KnnConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: Vec::new(),
        }
    }

    pub fn with_k(k: usize) -> Self {
        Self::new(KnnConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KnnConfig {
        &self.config
    }
}

impl<L> Default for KNearestNeighbors<L> {
    fn default() -> Self {
        Self::new(KnnConfig::default())
    }
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

impl<L: Ord + Clone> Classifier for KNearestNeighbors<L> {
    type Label = L;

    fn set_params(&mut self, params: &Params) -> TmleResult<()> {
        // Bind onto a copy so a rejected mapping leaves the model untouched.
        let mut config = self.config.clone();
        let mut names: Vec<&String> = params.keys().collect();
        names.sort();
        for name in names {
            config.bind(name, &params[name])?;
        }
        self.config = config;
        Ok(())
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert(
            "n_neighbors".to_string(),
            ParameterValue::Int(self.config.n_neighbors as i64),
        );
        params.insert(
            "weights".to_string(),
            ParameterValue::from(self.config.weights.as_str()),
        );
        params
    }

    fn fit(&mut self, x: &Array2<f64>, y: &[L]) -> TmleResult<()> {
        if x.nrows() != y.len() || y.is_empty() {
            return Err(ModelError::Training {
                message: format!("{} rows with {} labels", x.nrows(), y.len()),
            }
            .into());
        }
        debug!(
            "Fitting k-NN on {} samples (n_neighbors={}, weights={:?})",
            y.len(),
            self.config.n_neighbors,
            self.config.weights
        );
        self.x_train = Some(x.clone());
        self.y_train = y.to_vec();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> TmleResult<Vec<L>> {
        let x_train = self.x_train.as_ref().ok_or(ModelError::NotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(ModelError::Prediction {
                message: format!(
                    "expected {} features, got {}",
                    x_train.ncols(),
                    x.ncols()
                ),
            }
            .into());
        }
        let k = self.config.n_neighbors.min(self.y_train.len());

        let mut predictions = Vec::with_capacity(x.nrows());
        for row in x.rows() {
            let mut neighbors: Vec<(f64, usize)> = x_train
                .rows()
                .into_iter()
                .enumerate()
                .map(|(i, train_row)| (euclidean(row, train_row), i))
                .collect();
            neighbors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            neighbors.truncate(k);

            let votes = neighbors.iter().map(|&(dist, i)| {
                let weight = match self.config.weights {
                    WeightScheme::Uniform => 1.0,
                    WeightScheme::Distance => 1.0 / dist.max(1e-12),
                };
                (&self.y_train[i], weight)
            });
            let label = weighted_vote(votes).ok_or_else(|| ModelError::Prediction {
                message: "no neighbours available".to_string(),
            })?;
            predictions.push(label);
        }
        Ok(predictions)
    }
}
