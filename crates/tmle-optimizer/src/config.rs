//! Search configuration.

use serde::{Deserialize, Serialize};

use tmle_types::{config_error, SearchError, TmleResult};

use crate::search::{GridSearch, RandomSearch, SearchSpace, SearchStrategy};
use crate::split::StratifiedKFold;
use crate::tpe::TpeSearch;
use crate::trial::ObjectiveDirection;

/// Which strategy proposes candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchAlgorithm {
    Tpe,
    Random,
    /// Exhaustive grid; continuous axes get `steps` points.
    Grid { steps: usize },
}

impl Default for SearchAlgorithm {
    fn default() -> Self {
        Self::Tpe
    }
}

/// Top-level configuration for a cross-validated parameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of trials.
    pub max_evals: usize,
    /// Number of stratified folds per trial.
    pub n_splits: usize,
    /// Print the averaged scores of each trial.
    pub verbose: bool,
    /// Shuffle each class before assigning folds.
    pub shuffle: bool,
    /// Seed for the strategy and, when shuffling, the splitter.
    pub seed: Option<u64>,
    pub algorithm: SearchAlgorithm,
    /// Whether the metric is better when higher (loss = 1 - score) or lower.
    pub direction: ObjectiveDirection,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_evals: 10,
            n_splits: 3,
            verbose: true,
            shuffle: false,
            seed: None,
            algorithm: SearchAlgorithm::Tpe,
            direction: ObjectiveDirection::Maximize,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_evals(mut self, n: usize) -> Self {
        self.max_evals = n;
        self
    }

    pub fn with_n_splits(mut self, n: usize) -> Self {
        self.n_splits = n;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_algorithm(mut self, algorithm: SearchAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> TmleResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `TMLE_MAX_EVALS`, `TMLE_N_SPLITS`,
    /// `TMLE_VERBOSE` and `TMLE_SEED` when set.
    pub fn from_env() -> TmleResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> TmleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> TmleResult<T> {
            raw.trim()
                .parse()
                .map_err(|_| config_error!("{key} has invalid value {raw:?}"))
        }

        let mut config = Self::default();
        if let Some(raw) = lookup("TMLE_MAX_EVALS") {
            config.max_evals = parse("TMLE_MAX_EVALS", &raw)?;
        }
        if let Some(raw) = lookup("TMLE_N_SPLITS") {
            config.n_splits = parse("TMLE_N_SPLITS", &raw)?;
        }
        if let Some(raw) = lookup("TMLE_VERBOSE") {
            config.verbose = parse("TMLE_VERBOSE", &raw)?;
        }
        if let Some(raw) = lookup("TMLE_SEED") {
            config.seed = Some(parse("TMLE_SEED", &raw)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TmleResult<()> {
        if self.max_evals < 1 {
            return Err(SearchError::InvalidConfig {
                message: "max_evals must be at least 1".to_string(),
            }
            .into());
        }
        if self.n_splits < 2 {
            return Err(SearchError::InvalidConfig {
                message: format!("n_splits must be at least 2, got {}", self.n_splits),
            }
            .into());
        }
        Ok(())
    }

    /// The strategy named by `algorithm`, seeded from `seed`.
    pub fn build_strategy(&self, space: &SearchSpace) -> Box<dyn SearchStrategy> {
        match self.algorithm {
            SearchAlgorithm::Tpe => Box::new(TpeSearch::new(space.clone(), self.seed)),
            SearchAlgorithm::Random => Box::new(RandomSearch::with_seed(space.clone(), self.seed)),
            SearchAlgorithm::Grid { steps } => Box::new(GridSearch::new(space.clone(), steps)),
        }
    }

    pub fn build_splitter(&self) -> StratifiedKFold {
        let splitter = StratifiedKFold::new(self.n_splits);
        if self.shuffle {
            splitter.with_shuffle(self.seed)
        } else {
            splitter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.max_evals, 10);
        assert_eq!(config.n_splits, 3);
        assert!(config.verbose);
        assert!(!config.shuffle);
        assert_eq!(config.algorithm, SearchAlgorithm::Tpe);
        assert_eq!(config.direction, ObjectiveDirection::Maximize);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_chain() {
        let config = SearchConfig::new()
            .with_max_evals(50)
            .with_n_splits(5)
            .with_verbose(false)
            .with_shuffle(true)
            .with_seed(7)
            .with_algorithm(SearchAlgorithm::Grid { steps: 4 })
            .with_direction(ObjectiveDirection::Minimize);

        assert_eq!(config.max_evals, 50);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.build_splitter(), StratifiedKFold::new(5).with_shuffle(Some(7)));
    }

    #[test]
    fn json_with_partial_fields() {
        let config = SearchConfig::from_json(
            r#"{"max_evals": 25, "algorithm": {"kind": "grid", "steps": 3}, "direction": "minimize"}"#,
        )
        .unwrap();
        assert_eq!(config.max_evals, 25);
        assert_eq!(config.n_splits, 3);
        assert_eq!(config.algorithm, SearchAlgorithm::Grid { steps: 3 });
        assert_eq!(config.direction, ObjectiveDirection::Minimize);
    }

    #[test]
    fn json_validation_and_syntax_errors() {
        assert!(SearchConfig::from_json(r#"{"n_splits": 1}"#).is_err());
        assert!(SearchConfig::from_json(r#"{"max_evals": 0}"#).is_err());
        assert!(SearchConfig::from_json("{not json").is_err());
    }

    #[test]
    fn env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("TMLE_MAX_EVALS", "40"),
            ("TMLE_N_SPLITS", "4"),
            ("TMLE_VERBOSE", "false"),
            ("TMLE_SEED", "99"),
        ]
        .into_iter()
        .collect();
        let config = SearchConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_evals, 40);
        assert_eq!(config.n_splits, 4);
        assert!(!config.verbose);
        assert_eq!(config.seed, Some(99));
    }

    #[test]
    fn env_overlay_rejects_garbage() {
        let err = SearchConfig::from_lookup(|k| (k == "TMLE_N_SPLITS").then(|| "three".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TMLE_N_SPLITS"));
    }

    #[test]
    fn builds_named_strategy() {
        let space = SearchSpace::new().add_int("k", 1, 3);
        for (algorithm, name) in [
            (SearchAlgorithm::Tpe, "tpe"),
            (SearchAlgorithm::Random, "random"),
            (SearchAlgorithm::Grid { steps: 2 }, "grid"),
        ] {
            let config = SearchConfig::new().with_algorithm(algorithm).with_seed(1);
            assert_eq!(config.build_strategy(&space).name(), name);
        }
    }
}
