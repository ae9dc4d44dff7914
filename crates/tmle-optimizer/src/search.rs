//! Search space definitions and parameter sweep strategies.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use tmle_types::{ParameterValue, Params, SearchError, TmleResult};

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name as understood by the classifier (e.g. "n_neighbors").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Uniform range [low, high] snapped to multiples of `q`.
    QUniform { low: f64, high: f64, q: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

impl ParameterKind {
    /// Draw one value uniformly from this dimension.
    pub(crate) fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::FloatRange { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::QUniform { low, high, q } => {
                let raw: f64 = rng.random_range(*low..=*high);
                ParameterValue::Float(quantize(raw, *q))
            }
            Self::IntRange { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
            Self::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp().clamp(*low, *high))
            }
            Self::Choice { values } => {
                let idx = rng.random_range(0..values.len());
                ParameterValue::Json(values[idx].clone())
            }
        }
    }
}

pub(crate) fn quantize(value: f64, q: f64) -> f64 {
    (value / q).round() * q
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    fn push(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.push(name, ParameterKind::FloatRange { low, high })
    }

    pub fn add_quniform(self, name: impl Into<String>, low: f64, high: f64, q: f64) -> Self {
        self.push(name, ParameterKind::QUniform { low, high, q })
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.push(name, ParameterKind::IntRange { low, high })
    }

    pub fn add_log_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.push(name, ParameterKind::LogUniform { low, high })
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.push(name, ParameterKind::Choice { values })
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check every dimension can be sampled.
    pub fn validate(&self) -> TmleResult<()> {
        let invalid = |message: String| -> TmleResult<()> {
            Err(SearchError::InvalidSpace { message }.into())
        };

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return invalid(format!("duplicate parameter {}", param.name));
            }
            match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    if !(low.is_finite() && high.is_finite() && low <= high) {
                        return invalid(format!("{}: bad range [{low}, {high}]", param.name));
                    }
                }
                ParameterKind::QUniform { low, high, q } => {
                    if !(low.is_finite() && high.is_finite() && low <= high) {
                        return invalid(format!("{}: bad range [{low}, {high}]", param.name));
                    }
                    if !(q.is_finite() && *q > 0.0) {
                        return invalid(format!("{}: q must be positive, got {q}", param.name));
                    }
                }
                ParameterKind::IntRange { low, high } => {
                    if low > high {
                        return invalid(format!("{}: bad range [{low}, {high}]", param.name));
                    }
                }
                ParameterKind::LogUniform { low, high } => {
                    if !(*low > 0.0 && high.is_finite() && low <= high) {
                        return invalid(format!(
                            "{}: log-uniform bounds must be positive, got [{low}, {high}]",
                            param.name
                        ));
                    }
                }
                ParameterKind::Choice { values } => {
                    if values.is_empty() {
                        return invalid(format!("{}: no choices", param.name));
                    }
                }
            }
        }
        Ok(())
    }

    /// Total number of grid points. `None` if any parameter is continuous
    /// without a natural grid, or the count does not fit in `usize`.
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::IntRange { low, high } => span(*low, *high)?,
                ParameterKind::QUniform { low, high, q } => {
                    let (first, last) = quantized_bounds(*low, *high, *q);
                    span(first, last)?
                }
                ParameterKind::Choice { values } => values.len(),
                // Continuous dimensions need explicit step count.
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }
}

/// Number of integers in `low..=high`, if it fits in `usize`.
fn span(low: i64, high: i64) -> Option<usize> {
    let width = high.checked_sub(low)?.checked_add(1)?;
    usize::try_from(width).ok()
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Indices `k` of the first and last multiples `k * q` covering `[low, high]`.
fn quantized_bounds(low: f64, high: f64, q: f64) -> (i64, i64) {
    ((low / q).round() as i64, (high / q).round() as i64)
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send + Sync {
    /// Generate the next batch of parameter combinations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<Params>;

    /// Report a completed trial's loss so adaptive strategies can learn.
    fn report(&mut self, _params: &Params, _loss: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

impl<S: SearchStrategy + ?Sized> SearchStrategy for Box<S> {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        (**self).suggest(count)
    }

    fn report(&mut self, params: &Params, loss: f64) {
        (**self).report(params, loss)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    }
}

// ---- Grid search ----

/// Values along one grid axis, produced on demand.
#[derive(Debug, Clone)]
enum GridAxis {
    /// `first + k` for `k` in `0..len`.
    Ints { first: i64, len: u128 },
    /// `(first + k) * q` for `k` in `0..len`.
    Multiples { first: i64, len: u128, q: f64 },
    Values(Vec<ParameterValue>),
}

impl GridAxis {
    fn len(&self) -> u128 {
        match self {
            Self::Ints { len, .. } | Self::Multiples { len, .. } => *len,
            Self::Values(values) => values.len() as u128,
        }
    }

    fn value(&self, k: u128) -> ParameterValue {
        // k < len, so the offset always lands back inside the i64 range.
        let offset = |first: i64| (first as i128 + k as i128) as i64;
        match self {
            Self::Ints { first, .. } => ParameterValue::Int(offset(*first)),
            Self::Multiples { first, q, .. } => ParameterValue::Float(offset(*first) as f64 * q),
            Self::Values(values) => values[k as usize].clone(),
        }
    }
}

fn int_axis(first: i64, last: i64) -> (i64, u128) {
    (first, (last as i128 - first as i128 + 1).max(0) as u128)
}

/// Exhaustive grid search over discrete parameter combinations.
///
/// Combinations are decoded from a running index, so memory does not grow
/// with the size of the grid. The last parameter varies fastest.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: u128,
    /// `None` when the product of axis lengths overflows.
    total: Option<u128>,
    axes: Vec<(String, GridAxis)>,
}

impl GridSearch {
    /// `float_steps` is the number of points laid on each continuous axis.
    pub fn new(space: SearchSpace, float_steps: usize) -> Self {
        let axes = Self::build_axes(&space, float_steps);
        let total = axes
            .iter()
            .try_fold(1u128, |acc, (_, axis)| acc.checked_mul(axis.len()));
        Self {
            cursor: 0,
            total,
            axes,
        }
    }

    /// Combinations not yet handed out, saturating at `usize::MAX`.
    pub fn remaining(&self) -> usize {
        match self.total {
            Some(total) => usize::try_from(total - self.cursor).unwrap_or(usize::MAX),
            None => usize::MAX,
        }
    }

    fn build_axes(space: &SearchSpace, float_steps: usize) -> Vec<(String, GridAxis)> {
        let steps = float_steps.max(2);
        let lerp = |low: f64, high: f64, i: usize| low + (i as f64 / (steps - 1) as f64) * (high - low);

        space
            .parameters
            .iter()
            .map(|param| {
                let axis = match &param.kind {
                    ParameterKind::FloatRange { low, high } => GridAxis::Values(
                        (0..steps)
                            .map(|i| ParameterValue::Float(lerp(*low, *high, i)))
                            .collect(),
                    ),
                    ParameterKind::QUniform { low, high, q } => {
                        let (first, last) = quantized_bounds(*low, *high, *q);
                        let (first, len) = int_axis(first, last);
                        GridAxis::Multiples { first, len, q: *q }
                    }
                    ParameterKind::IntRange { low, high } => {
                        let (first, len) = int_axis(*low, *high);
                        GridAxis::Ints { first, len }
                    }
                    ParameterKind::LogUniform { low, high } => GridAxis::Values(
                        (0..steps)
                            .map(|i| ParameterValue::Float(lerp(low.ln(), high.ln(), i).exp()))
                            .collect(),
                    ),
                    ParameterKind::Choice { values } => GridAxis::Values(
                        values.iter().map(|v| ParameterValue::Json(v.clone())).collect(),
                    ),
                };
                (param.name.clone(), axis)
            })
            .collect()
    }

    fn combination(&self, mut index: u128) -> Params {
        let mut params = Params::new();
        for (name, axis) in self.axes.iter().rev() {
            let len = axis.len();
            params.insert(name.clone(), axis.value(index % len));
            index /= len;
        }
        params
    }

    fn exhausted(&self) -> bool {
        let empty_axis = self.axes.iter().any(|(_, axis)| axis.len() == 0);
        empty_axis || self.total.is_some_and(|total| self.cursor >= total)
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        let mut batch = Vec::new();
        while batch.len() < count && !self.exhausted() {
            batch.push(self.combination(self.cursor));
            self.cursor += 1;
        }
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self::with_seed(space, None)
    }

    pub fn with_seed(space: SearchSpace, seed: Option<u64>) -> Self {
        Self {
            space,
            rng: seeded_rng(seed),
        }
    }

    fn sample_one(&mut self) -> Params {
        sample_space(&self.space, &mut self.rng)
    }
}

pub(crate) fn sample_space<R: Rng>(space: &SearchSpace, rng: &mut R) -> Params {
    space
        .parameters
        .iter()
        .map(|param| (param.name.clone(), param.kind.sample(rng)))
        .collect()
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}
