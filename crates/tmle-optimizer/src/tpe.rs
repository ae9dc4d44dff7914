//! Tree-structured Parzen estimator search.
//!
//! Past trials are split by loss into a "good" set and a "bad" set. Each
//! parameter is modelled independently by two densities, l(x) over the good
//! set and g(x) over the bad set; candidates are drawn from l(x) and the one
//! with the largest l(x)/g(x) ratio is suggested.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use tmle_types::{ParameterValue, Params};

use crate::search::{quantize, sample_space, seeded_rng, ParameterKind, SearchSpace, SearchStrategy};

/// Tuning knobs of the estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpeConfig {
    /// Suggestions drawn uniformly before the model kicks in.
    pub n_startup: usize,
    /// Fraction (scaled by √n) of trials treated as good.
    pub gamma: f64,
    /// Upper bound on the size of the good set.
    pub max_good: usize,
    /// Candidates drawn from l(x) per parameter.
    pub n_ei_candidates: usize,
    /// Weight of the uniform prior component in each density.
    pub prior_weight: f64,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            n_startup: 20,
            gamma: 0.25,
            max_good: 25,
            n_ei_candidates: 24,
            prior_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TpeSearch {
    space: SearchSpace,
    config: TpeConfig,
    rng: ChaCha8Rng,
    observations: Vec<(Params, f64)>,
}

impl TpeSearch {
    pub fn new(space: SearchSpace, seed: Option<u64>) -> Self {
        Self::with_config(space, TpeConfig::default(), seed)
    }

    pub fn with_config(space: SearchSpace, config: TpeConfig, seed: Option<u64>) -> Self {
        Self {
            space,
            config,
            rng: seeded_rng(seed),
            observations: Vec::new(),
        }
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Number of lowest-loss observations modelled by l(x).
    fn n_good(&self) -> usize {
        let n = self.observations.len() as f64;
        let n_good = (self.config.gamma * n.sqrt()).ceil() as usize;
        n_good.clamp(1, self.config.max_good)
    }

    fn suggest_one(&mut self) -> Params {
        if self.observations.len() < self.config.n_startup.max(2) {
            return sample_space(&self.space, &mut self.rng);
        }

        let mut ranked: Vec<&(Params, f64)> = self.observations.iter().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (good, bad) = ranked.split_at(self.n_good());

        let mut params = Params::new();
        for def in &self.space.parameters {
            let good_values: Vec<&ParameterValue> =
                good.iter().filter_map(|(p, _)| p.get(&def.name)).collect();
            let bad_values: Vec<&ParameterValue> =
                bad.iter().filter_map(|(p, _)| p.get(&def.name)).collect();

            let value = match &def.kind {
                ParameterKind::Choice { values } => {
                    let index_of = |v: &ParameterValue| match v {
                        ParameterValue::Json(json) => values.iter().position(|c| c == json),
                        _ => None,
                    };
                    let good_idx: Vec<usize> = good_values.iter().filter_map(|v| index_of(*v)).collect();
                    let bad_idx: Vec<usize> = bad_values.iter().filter_map(|v| index_of(*v)).collect();
                    let chosen = sample_categorical(
                        values.len(),
                        &good_idx,
                        &bad_idx,
                        self.config.n_ei_candidates,
                        self.config.prior_weight,
                        &mut self.rng,
                    );
                    ParameterValue::Json(values[chosen].clone())
                }
                kind => {
                    let numeric = NumericAxis::from_kind(kind);
                    let good_x: Vec<f64> = good_values.iter().filter_map(|v| numeric.encode(v)).collect();
                    let bad_x: Vec<f64> = bad_values.iter().filter_map(|v| numeric.encode(v)).collect();
                    let x = sample_numeric(
                        &numeric,
                        &good_x,
                        &bad_x,
                        self.config.n_ei_candidates,
                        self.config.prior_weight,
                        &mut self.rng,
                    );
                    numeric.decode(x)
                }
            };
            params.insert(def.name.clone(), value);
        }
        params
    }
}

impl SearchStrategy for TpeSearch {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        (0..count).map(|_| self.suggest_one()).collect()
    }

    fn report(&mut self, params: &Params, loss: f64) {
        if !loss.is_finite() {
            debug!("Ignoring non-finite loss {} in TPE history", loss);
            return;
        }
        self.observations.push((params.clone(), loss));
    }

    fn name(&self) -> &str {
        "tpe"
    }
}

/// A numeric dimension mapped onto the real line the densities live on.
#[derive(Debug, Clone, Copy)]
enum Transform {
    Linear,
    Quantized(f64),
    Integer,
    Log,
}

#[derive(Debug, Clone, Copy)]
struct NumericAxis {
    low: f64,
    high: f64,
    transform: Transform,
    /// Declared bounds used to clamp the final value.
    bounds: (f64, f64),
}

impl NumericAxis {
    fn from_kind(kind: &ParameterKind) -> Self {
        match kind {
            ParameterKind::FloatRange { low, high } => Self {
                low: *low,
                high: *high,
                transform: Transform::Linear,
                bounds: (*low, *high),
            },
            ParameterKind::QUniform { low, high, q } => Self {
                low: *low,
                high: *high,
                transform: Transform::Quantized(*q),
                bounds: (*low, *high),
            },
            ParameterKind::IntRange { low, high } => Self {
                low: *low as f64 - 0.5,
                high: *high as f64 + 0.5,
                transform: Transform::Integer,
                bounds: (*low as f64, *high as f64),
            },
            ParameterKind::LogUniform { low, high } => Self {
                low: low.ln(),
                high: high.ln(),
                transform: Transform::Log,
                bounds: (*low, *high),
            },
            ParameterKind::Choice { .. } => unreachable!("categorical parameters are not numeric"),
        }
    }

    fn encode(&self, value: &ParameterValue) -> Option<f64> {
        let x = value.as_f64()?;
        match self.transform {
            Transform::Log if x > 0.0 => Some(x.ln()),
            Transform::Log => None,
            _ => Some(x),
        }
    }

    fn decode(&self, x: f64) -> ParameterValue {
        let (low, high) = self.bounds;
        match self.transform {
            Transform::Linear => ParameterValue::Float(x.clamp(low, high)),
            Transform::Quantized(q) => ParameterValue::Float(quantize(x.clamp(low, high), q)),
            Transform::Integer => ParameterValue::Int(x.round().clamp(low, high) as i64),
            Transform::Log => ParameterValue::Float(x.exp().clamp(low, high)),
        }
    }
}

/// Gaussian mixture with one component per observation plus a broad prior
/// component centred on the range.
#[derive(Debug, Clone)]
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    weights: Vec<f64>,
}

impl ParzenEstimator {
    fn fit(observations: &[f64], low: f64, high: f64, prior_weight: f64) -> Self {
        let prior_sigma = if high > low { high - low } else { 1.0 };
        let prior_mu = 0.5 * (low + high);

        let mut points: Vec<(f64, bool)> = observations.iter().map(|&x| (x, false)).collect();
        points.push((prior_mu, true));
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Bandwidth of each component is the larger gap to its neighbours,
        // kept between a floor that shrinks with the sample count and the
        // prior's width.
        let min_sigma = prior_sigma / (1.0 + points.len() as f64).min(100.0);
        let mut mus = Vec::with_capacity(points.len());
        let mut sigmas = Vec::with_capacity(points.len());
        let mut weights = Vec::with_capacity(points.len());
        for (i, &(mu, is_prior)) in points.iter().enumerate() {
            let left = if i > 0 { mu - points[i - 1].0 } else { mu - low };
            let right = if i + 1 < points.len() {
                points[i + 1].0 - mu
            } else {
                high - mu
            };
            let sigma = if is_prior {
                prior_sigma
            } else {
                left.max(right).clamp(min_sigma, prior_sigma)
            };
            mus.push(mu);
            sigmas.push(sigma);
            weights.push(if is_prior { prior_weight } else { 1.0 });
        }

        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        Self {
            mus,
            sigmas,
            weights,
        }
    }

    fn pdf(&self, x: f64) -> f64 {
        self.mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.weights)
            .map(|((mu, sigma), w)| {
                let z = (x - mu) / sigma;
                w * (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt())
            })
            .sum()
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let threshold: f64 = rng.random();
        let mut cumulative = 0.0;
        let mut component = self.weights.len() - 1;
        for (i, w) in self.weights.iter().enumerate() {
            cumulative += w;
            if cumulative >= threshold {
                component = i;
                break;
            }
        }
        self.mus[component] + standard_normal(rng) * self.sigmas[component]
    }
}

/// Box-Muller transform.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn sample_numeric<R: Rng>(
    axis: &NumericAxis,
    good: &[f64],
    bad: &[f64],
    n_candidates: usize,
    prior_weight: f64,
    rng: &mut R,
) -> f64 {
    let l = ParzenEstimator::fit(good, axis.low, axis.high, prior_weight);
    let g = ParzenEstimator::fit(bad, axis.low, axis.high, prior_weight);

    let mut best = (f64::NEG_INFINITY, 0.5 * (axis.low + axis.high));
    for _ in 0..n_candidates.max(1) {
        let candidate = l.sample(rng).clamp(axis.low, axis.high);
        let score = l.pdf(candidate).ln() - g.pdf(candidate).ln();
        if score > best.0 {
            best = (score, candidate);
        }
    }
    best.1
}

fn sample_categorical<R: Rng>(
    n_choices: usize,
    good: &[usize],
    bad: &[usize],
    n_candidates: usize,
    prior_weight: f64,
    rng: &mut R,
) -> usize {
    let smoothed = |indices: &[usize]| -> Vec<f64> {
        let mut counts = vec![prior_weight; n_choices];
        for &i in indices {
            counts[i] += 1.0;
        }
        let total: f64 = counts.iter().sum();
        counts.into_iter().map(|c| c / total).collect()
    };
    let l = smoothed(good);
    let g = smoothed(bad);

    let mut best = (f64::NEG_INFINITY, 0);
    for _ in 0..n_candidates.max(1) {
        let threshold: f64 = rng.random();
        let mut cumulative = 0.0;
        let mut candidate = n_choices - 1;
        for (i, p) in l.iter().enumerate() {
            cumulative += p;
            if cumulative >= threshold {
                candidate = i;
                break;
            }
        }
        let score = l[candidate] / g[candidate];
        if score > best.0 {
            best = (score, candidate);
        }
    }
    best.1
}
