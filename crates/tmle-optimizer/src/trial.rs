//! Trial records and search history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tmle_types::Params;

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Whether the scoring metric is better when higher or lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Maximize
    }
}

impl ObjectiveDirection {
    /// Turn a mean validation score into the loss handed to the minimizer.
    ///
    /// Maximized scores are assumed to lie in `[0, 1]`.
    pub fn loss(&self, score: f64) -> f64 {
        match self {
            Self::Maximize => 1.0 - score,
            Self::Minimize => score,
        }
    }
}

/// Outcome reported by the objective for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Fail,
}

/// Mean train and validation scores of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub train: f64,
    pub valid: f64,
}

/// Scores of a single cross-validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub fold: usize,
    pub train: f64,
    pub valid: f64,
}

/// What the objective returns to the minimizer for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub loss: f64,
    pub status: ResultStatus,
    pub score: Score,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folds: Vec<FoldScore>,
}

impl TrialResult {
    pub fn ok(loss: f64, score: Score) -> Self {
        Self {
            loss,
            status: ResultStatus::Ok,
            score,
            folds: Vec::new(),
        }
    }

    pub fn with_folds(mut self, folds: Vec<FoldScore>) -> Self {
        self.folds = folds;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A single trial (one parameter assignment evaluated by the objective).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    /// Position in the search history, starting at 0.
    pub tid: usize,
    pub parameters: Params,
    pub status: TrialStatus,
    pub result: Option<TrialResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(tid: usize, parameters: Params) -> Self {
        Self {
            id: Uuid::new_v4(),
            tid,
            parameters,
            status: TrialStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: TrialResult) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Loss of a completed trial whose objective reported `ok`.
    pub fn ok_loss(&self) -> Option<f64> {
        match (&self.status, &self.result) {
            (TrialStatus::Completed, Some(result)) if result.is_ok() => Some(result.loss),
            _ => None,
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }
}

/// History of one search run. Reusing a history across searches counts its
/// trials toward the next search's evaluation budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trials {
    pub id: SearchId,
    trials: Vec<Trial>,
}

impl Trials {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            trials: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter()
    }

    pub fn get(&self, tid: usize) -> Option<&Trial> {
        self.trials.get(tid)
    }

    /// Register a new running trial for `parameters`; returns its `tid`.
    pub fn start(&mut self, parameters: Params) -> usize {
        let tid = self.trials.len();
        let mut trial = Trial::new(tid, parameters);
        trial.mark_running();
        self.trials.push(trial);
        tid
    }

    pub fn complete(&mut self, tid: usize, result: TrialResult) {
        if let Some(trial) = self.trials.get_mut(tid) {
            trial.mark_completed(result);
        }
    }

    pub fn fail(&mut self, tid: usize, error: String) {
        if let Some(trial) = self.trials.get_mut(tid) {
            trial.mark_failed(error);
        }
    }

    /// Losses of successful trials, in evaluation order.
    pub fn losses(&self) -> Vec<f64> {
        self.trials.iter().filter_map(Trial::ok_loss).collect()
    }

    /// Successful trial with the lowest loss; the earliest wins ties.
    /// NaN losses are never selected.
    pub fn best_trial(&self) -> Option<&Trial> {
        let mut best: Option<(&Trial, f64)> = None;
        for trial in &self.trials {
            let Some(loss) = trial.ok_loss().filter(|l| !l.is_nan()) else {
                continue;
            };
            match best {
                Some((_, best_loss)) if loss >= best_loss => {}
                _ => best = Some((trial, loss)),
            }
        }
        best.map(|(trial, _)| trial)
    }
}

impl Default for Trials {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmle_types::ParameterValue;

    fn result(loss: f64) -> TrialResult {
        TrialResult::ok(
            loss,
            Score {
                train: 1.0,
                valid: 1.0 - loss,
            },
        )
    }

    #[test]
    fn result_serializes_in_objective_shape() {
        let json = serde_json::to_value(result(0.25)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "loss": 0.25,
                "status": "ok",
                "score": {"train": 1.0, "valid": 0.75}
            })
        );
    }

    #[test]
    fn direction_conversion() {
        assert!((ObjectiveDirection::Maximize.loss(0.8) - 0.2).abs() < 1e-12);
        assert_eq!(ObjectiveDirection::Minimize.loss(0.8), 0.8);
        assert_eq!(ObjectiveDirection::default(), ObjectiveDirection::Maximize);
    }

    #[test]
    fn trial_lifecycle() {
        let mut params = Params::new();
        params.insert("n_neighbors".into(), ParameterValue::Int(10));

        let mut trial = Trial::new(0, params);
        assert_eq!(trial.status, TrialStatus::Pending);

        trial.mark_running();
        assert_eq!(trial.status, TrialStatus::Running);
        assert!(trial.started_at.is_some());

        trial.mark_completed(result(0.1));
        assert_eq!(trial.status, TrialStatus::Completed);
        assert!(trial.finished_at.is_some());
        assert!(trial.duration_seconds().unwrap() >= 0.0);
        assert_eq!(trial.ok_loss(), Some(0.1));
    }

    #[test]
    fn trial_failure() {
        let mut trials = Trials::new();
        let tid = trials.start(Params::new());
        trials.fail(tid, "fit panicked".into());

        let trial = trials.get(tid).unwrap();
        assert_eq!(trial.status, TrialStatus::Failed);
        assert_eq!(trial.error.as_deref(), Some("fit panicked"));
        assert_eq!(trial.ok_loss(), None);
    }

    #[test]
    fn best_trial_tracking() {
        let mut trials = Trials::new();
        for loss in [0.4, 0.2, 0.3, 0.2] {
            let tid = trials.start(Params::new());
            trials.complete(tid, result(loss));
        }
        let failed = trials.start(Params::new());
        trials.fail(failed, "boom".into());

        let mut fail_status = result(0.0);
        fail_status.status = ResultStatus::Fail;
        let tid = trials.start(Params::new());
        trials.complete(tid, fail_status);

        assert_eq!(trials.len(), 6);
        assert_eq!(trials.losses(), vec![0.4, 0.2, 0.3, 0.2]);
        // Earliest of the tied minima.
        assert_eq!(trials.best_trial().unwrap().tid, 1);
    }

    #[test]
    fn best_trial_skips_nan_losses() {
        let mut trials = Trials::new();
        for loss in [f64::NAN, 0.3, 0.1] {
            let tid = trials.start(Params::new());
            trials.complete(tid, result(loss));
        }
        assert_eq!(trials.best_trial().unwrap().tid, 2);
        assert_eq!(trials.losses().len(), 3);

        let mut only_nan = Trials::new();
        let tid = only_nan.start(Params::new());
        only_nan.complete(tid, result(f64::NAN));
        assert!(only_nan.best_trial().is_none());
    }

    #[test]
    fn best_trial_none_without_success() {
        let mut trials = Trials::new();
        let tid = trials.start(Params::new());
        trials.fail(tid, "boom".into());
        assert!(trials.best_trial().is_none());
    }
}
