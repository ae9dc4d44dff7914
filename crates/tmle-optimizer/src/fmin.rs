//! Sequential minimization loop over a search strategy.

use tracing::{debug, info, warn};

use tmle_types::{format_params, Params, SearchError, TmleResult};

use crate::search::{SearchSpace, SearchStrategy};
use crate::trial::{TrialResult, Trials};

/// Objective evaluated once per trial.
pub type Objective<'f> = dyn FnMut(&Params) -> TmleResult<TrialResult> + 'f;

/// A black-box minimizer: proposes candidates, feeds them to the objective
/// and keeps track of the lowest loss.
pub trait Optimizer {
    /// Run until `trials` holds `max_evals` entries (or the optimizer has
    /// nothing left to propose) and return the best parameters seen.
    fn minimize(
        &mut self,
        space: &SearchSpace,
        max_evals: usize,
        trials: &mut Trials,
        objective: &mut Objective<'_>,
    ) -> TmleResult<Params>;
}

/// One-candidate-at-a-time minimizer driving a [`SearchStrategy`].
///
/// Completed trials already present in the history are reported to the
/// strategy before new candidates are drawn, so a resumed search conditions
/// on everything recorded so far.
#[derive(Debug, Clone)]
pub struct Fmin<S> {
    strategy: S,
    /// Trials before this index have been reported to the strategy.
    reported: usize,
}

impl<S: SearchStrategy> Fmin<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            reported: 0,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn into_strategy(self) -> S {
        self.strategy
    }

    /// Report successful trials the strategy has not seen yet.
    fn catch_up(&mut self, trials: &Trials) {
        for trial in trials.iter().skip(self.reported) {
            if let Some(loss) = trial.ok_loss() {
                self.strategy.report(&trial.parameters, loss);
            }
        }
        self.reported = self.reported.max(trials.len());
    }
}

impl<S: SearchStrategy> Optimizer for Fmin<S> {
    fn minimize(
        &mut self,
        space: &SearchSpace,
        max_evals: usize,
        trials: &mut Trials,
        objective: &mut Objective<'_>,
    ) -> TmleResult<Params> {
        if max_evals == 0 {
            return Err(SearchError::InvalidConfig {
                message: "max_evals must be at least 1".to_string(),
            }
            .into());
        }
        space.validate()?;

        info!(
            "Starting {} search: {} parameters, {} evaluations ({} already recorded)",
            self.strategy.name(),
            space.len(),
            max_evals,
            trials.len()
        );
        self.catch_up(trials);

        while trials.len() < max_evals {
            let Some(params) = self.strategy.suggest(1).into_iter().next() else {
                info!("{} strategy exhausted after {} trials", self.strategy.name(), trials.len());
                break;
            };

            let tid = trials.start(params.clone());
            debug!("Trial {}: {}", tid, format_params(&params));

            match objective(&params) {
                Ok(result) => {
                    if !result.is_ok() {
                        warn!("Trial {} reported failure status", tid);
                    }
                    debug!("Trial {} finished with loss {:.6}", tid, result.loss);
                    trials.complete(tid, result);
                    self.catch_up(trials);
                }
                Err(err) => {
                    trials.fail(tid, err.to_string());
                    self.catch_up(trials);
                    return Err(err);
                }
            }
        }

        let best = trials.best_trial().ok_or(SearchError::NoSuccessfulTrials {
            attempted: trials.len(),
        })?;
        info!(
            "Best trial {} with loss {:.6}: {}",
            best.tid,
            best.ok_loss().unwrap_or(f64::NAN),
            format_params(&best.parameters)
        );
        Ok(best.parameters.clone())
    }
}
