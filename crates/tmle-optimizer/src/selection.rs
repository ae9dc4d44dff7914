//! Cross-validated parameter search for a single classifier.
//!
//! [`ClassifierOptimizer`] bridges a minimizer to a scoring procedure: each
//! candidate is applied to the borrowed classifier, scored with stratified
//! k-fold cross-validation and turned into a loss. The classifier is mutated
//! in place on every evaluation, so after a search it holds the parameters
//! and weights of the last candidate evaluated, not of the best one.

use std::fmt::Debug;

use tracing::{debug, info, warn};

use tmle_types::{format_params, internal_error, Classifier, Dataset, Params, TmleResult};

use crate::config::SearchConfig;
use crate::fmin::{Fmin, Optimizer};
use crate::search::SearchSpace;
use crate::split::{Splitter, StratifiedKFold};
use crate::tpe::TpeSearch;
use crate::trial::{FoldScore, ObjectiveDirection, Score, TrialResult, Trials};

/// Best parameters of a configured search together with its history.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_params: Params,
    pub best_loss: f64,
    pub trials: Trials,
}

pub struct ClassifierOptimizer<'a, C, M> {
    classifier: &'a mut C,
    space: SearchSpace,
    metric: M,
    direction: ObjectiveDirection,
}

impl<'a, C, M> ClassifierOptimizer<'a, C, M>
where
    C: Classifier,
    C::Label: PartialEq + Debug,
    M: Fn(&[C::Label], &[C::Label]) -> f64,
{
    /// `metric(y_true, y_pred)` is treated as higher-is-better in `[0, 1]`
    /// unless [`with_direction`](Self::with_direction) says otherwise.
    pub fn new(classifier: &'a mut C, space: SearchSpace, metric: M) -> Self {
        Self {
            classifier,
            space,
            metric,
            direction: ObjectiveDirection::Maximize,
        }
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn classifier(&self) -> &C {
        &*self.classifier
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Search with TPE and `n_splits` unshuffled stratified folds.
    pub fn find_best_params(
        &mut self,
        data: &Dataset<C::Label>,
        max_evals: usize,
        n_splits: usize,
        verbose: bool,
    ) -> TmleResult<Params> {
        let mut optimizer = Fmin::new(TpeSearch::new(self.space.clone(), None));
        let splitter = StratifiedKFold::new(n_splits);
        let mut trials = Trials::new();
        self.find_best_params_with(data, &mut optimizer, &splitter, &mut trials, max_evals, verbose)
    }

    /// Search with caller-supplied optimizer, splitter and trial history.
    pub fn find_best_params_with<O, S>(
        &mut self,
        data: &Dataset<C::Label>,
        optimizer: &mut O,
        splitter: &S,
        trials: &mut Trials,
        max_evals: usize,
        verbose: bool,
    ) -> TmleResult<Params>
    where
        O: Optimizer + ?Sized,
        S: Splitter<C::Label> + ?Sized,
    {
        let direction = self.direction;
        self.run(data, optimizer, splitter, trials, max_evals, verbose, direction)
    }

    /// Search as described by `config`, keeping the full trial history.
    pub fn search(&mut self, data: &Dataset<C::Label>, config: &SearchConfig) -> TmleResult<SearchOutcome> {
        config.validate()?;
        let mut optimizer = Fmin::new(config.build_strategy(&self.space));
        let splitter = config.build_splitter();
        let mut trials = Trials::new();

        let best_params = self.run(
            data,
            &mut optimizer,
            &splitter,
            &mut trials,
            config.max_evals,
            config.verbose,
            config.direction,
        )?;
        let best_loss = trials
            .best_trial()
            .and_then(|t| t.ok_loss())
            .ok_or_else(|| internal_error!("search returned without a successful trial"))?;

        Ok(SearchOutcome {
            best_params,
            best_loss,
            trials,
        })
    }

    /// Apply `params` and score them with `n_splits` unshuffled stratified folds.
    pub fn evaluate_params(
        &mut self,
        params: &Params,
        data: &Dataset<C::Label>,
        n_splits: usize,
        verbose: bool,
    ) -> TmleResult<TrialResult> {
        self.evaluate_params_with(params, data, &StratifiedKFold::new(n_splits), verbose)
    }

    /// Apply `params` and score them over the folds produced by `splitter`.
    pub fn evaluate_params_with<S>(
        &mut self,
        params: &Params,
        data: &Dataset<C::Label>,
        splitter: &S,
        verbose: bool,
    ) -> TmleResult<TrialResult>
    where
        S: Splitter<C::Label> + ?Sized,
    {
        let direction = self.direction;
        self.evaluate(params, data, splitter, verbose, direction)
    }

    #[allow(clippy::too_many_arguments)]
    fn run<O, S>(
        &mut self,
        data: &Dataset<C::Label>,
        optimizer: &mut O,
        splitter: &S,
        trials: &mut Trials,
        max_evals: usize,
        verbose: bool,
        direction: ObjectiveDirection,
    ) -> TmleResult<Params>
    where
        O: Optimizer + ?Sized,
        S: Splitter<C::Label> + ?Sized,
    {
        info!(
            "Searching {} parameters over {} samples, {} evaluations",
            self.space.len(),
            data.len(),
            max_evals
        );
        let space = self.space.clone();
        let mut objective = |params: &Params| self.evaluate(params, data, splitter, verbose, direction);
        let best = optimizer.minimize(&space, max_evals, trials, &mut objective)?;
        info!("Best parameters: {}", format_params(&best));
        Ok(best)
    }

    fn evaluate<S>(
        &mut self,
        params: &Params,
        data: &Dataset<C::Label>,
        splitter: &S,
        verbose: bool,
        direction: ObjectiveDirection,
    ) -> TmleResult<TrialResult>
    where
        S: Splitter<C::Label> + ?Sized,
    {
        self.classifier.set_params(params)?;

        let folds = splitter.split(data.labels())?;
        if folds.is_empty() {
            return Err(internal_error!("splitter produced no folds"));
        }

        let mut fold_scores = Vec::with_capacity(folds.len());
        for fold in &folds {
            let train = data.subset(&fold.train)?;
            let valid = data.subset(&fold.valid)?;

            self.classifier.fit(train.features(), train.labels())?;
            let train_pred = self.classifier.predict(train.features())?;
            let valid_pred = self.classifier.predict(valid.features())?;

            let score = FoldScore {
                fold: fold.index,
                train: (self.metric)(train.labels(), &train_pred),
                valid: (self.metric)(valid.labels(), &valid_pred),
            };
            debug!(
                "Fold {}: train={:.4} valid={:.4} ({} / {} samples)",
                score.fold,
                score.train,
                score.valid,
                train.len(),
                valid.len()
            );
            fold_scores.push(score);
        }

        let n = fold_scores.len() as f64;
        let score = Score {
            train: fold_scores.iter().map(|f| f.train).sum::<f64>() / n,
            valid: fold_scores.iter().map(|f| f.valid).sum::<f64>() / n,
        };

        if verbose {
            println!("{}", progress_line(&score));
        }
        if direction == ObjectiveDirection::Maximize && !(0.0..=1.0).contains(&score.valid) {
            warn!(
                "Validation score {} lies outside [0, 1]; loss 1 - score is not meaningful",
                score.valid
            );
        }

        Ok(TrialResult::ok(direction.loss(score.valid), score).with_folds(fold_scores))
    }
}

/// Console line printed per trial in verbose mode.
fn progress_line(score: &Score) -> String {
    format!("Train: {:.4}, valid: {:.4}", score.train, score.valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchAlgorithm;
    use crate::search::GridSearch;
    use crate::split::Fold;
    use ndarray::Array2;
    use tmle_types::metrics::accuracy;
    use tmle_types::{
        KNearestNeighbors, MajorityClassifier, ParamError, ParameterValue, SplitError, TmleError,
    };

    const EPS: f64 = 1e-12;

    /// Predicts a constant label chosen through the `label` parameter.
    #[derive(Debug, Default)]
    struct ConstantClassifier {
        label: i64,
        applied: Vec<Params>,
        fits: usize,
    }

    impl Classifier for ConstantClassifier {
        type Label = i64;

        fn set_params(&mut self, params: &Params) -> TmleResult<()> {
            for (name, value) in params {
                match name.as_str() {
                    "label" => self.label = value.expect_i64(name)?,
                    _ => return Err(ParamError::Unknown { name: name.clone() }.into()),
                }
            }
            self.applied.push(params.clone());
            Ok(())
        }

        fn get_params(&self) -> Params {
            let mut params = Params::new();
            params.insert("label".into(), ParameterValue::Int(self.label));
            params
        }

        fn fit(&mut self, _x: &Array2<f64>, _y: &[i64]) -> TmleResult<()> {
            self.fits += 1;
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> TmleResult<Vec<i64>> {
            Ok(vec![self.label; x.nrows()])
        }
    }

    /// Hands out a fixed set of folds regardless of the labels.
    struct FixedSplitter(Vec<Fold>);

    impl<L> Splitter<L> for FixedSplitter {
        fn split(&self, _labels: &[L]) -> TmleResult<Vec<Fold>> {
            Ok(self.0.clone())
        }
    }

    fn balanced_dataset() -> Dataset<i64> {
        let x = Array2::from_shape_fn((12, 2), |(i, j)| (i * 2 + j) as f64);
        let y = vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        Dataset::new(x, y).unwrap()
    }

    fn separable_dataset() -> Dataset<i64> {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| if i < 15 { i as f64 } else { 100.0 + i as f64 });
        let y = (0..30).map(|i| if i < 15 { 0 } else { 1 }).collect();
        Dataset::new(x, y).unwrap()
    }

    fn label_space() -> SearchSpace {
        SearchSpace::new().add_int("label", 0, 1)
    }

    #[test]
    fn majority_classifier_on_balanced_folds() {
        let data = balanced_dataset();
        let mut clf = MajorityClassifier::new();
        let mut opt = ClassifierOptimizer::new(&mut clf, SearchSpace::new(), accuracy::<i64>);

        let result = opt.evaluate_params(&Params::new(), &data, 3, false).unwrap();

        assert_eq!(result.folds.len(), 3);
        for fold in &result.folds {
            assert!((fold.train - 0.5).abs() < EPS);
            assert!((fold.valid - 0.5).abs() < EPS);
        }
        assert!((result.score.train - 0.5).abs() < EPS);
        assert!((result.score.valid - 0.5).abs() < EPS);
        assert!((result.loss - 0.5).abs() < EPS);
        assert!(result.is_ok());

        let again = opt.evaluate_params(&Params::new(), &data, 3, false).unwrap();
        assert_eq!(result, again);
    }

    #[test]
    fn progress_line_rounds_to_four_decimals() {
        let score = Score {
            train: 2.0 / 3.0,
            valid: 0.5,
        };
        assert_eq!(progress_line(&score), "Train: 0.6667, valid: 0.5000");

        let score = Score {
            train: 1.0,
            valid: 1.0 / 3.0,
        };
        assert_eq!(progress_line(&score), "Train: 1.0000, valid: 0.3333");
    }

    #[test]
    fn nan_scoring_candidate_is_never_best() {
        let data = balanced_dataset();
        let mut clf = ConstantClassifier::default();
        // label=0 is evaluated first and scores NaN; label=1 is perfect.
        let nan_for_zero = |_: &[i64], p: &[i64]| if p.iter().all(|&l| l == 0) { f64::NAN } else { 1.0 };

        let mut optimizer = Fmin::new(GridSearch::new(label_space(), 2));
        let mut trials = Trials::new();
        let best = ClassifierOptimizer::new(&mut clf, label_space(), nan_for_zero)
            .find_best_params_with(
                &data,
                &mut optimizer,
                &StratifiedKFold::new(3),
                &mut trials,
                2,
                false,
            )
            .unwrap();

        assert_eq!(best["label"], ParameterValue::Int(1));
        assert!(trials.losses()[0].is_nan());
        assert_eq!(trials.best_trial().unwrap().tid, 1);
    }

    #[test]
    fn loss_is_one_minus_mean_valid_score() {
        let data = balanced_dataset();
        let splitter = FixedSplitter(vec![
            Fold { index: 0, train: (2..12).collect(), valid: vec![0, 1] },
            Fold { index: 1, train: (0..8).collect(), valid: (8..12).collect() },
        ]);
        // Score each partition by its size so each fold scores differently.
        let by_size = |y_true: &[i64], _: &[i64]| y_true.len() as f64 / 20.0;
        let mut clf = ConstantClassifier::default();
        let mut opt = ClassifierOptimizer::new(&mut clf, label_space(), by_size);

        let result = opt
            .evaluate_params_with(&Params::new(), &data, &splitter, false)
            .unwrap();

        let valid = [2.0 / 20.0, 4.0 / 20.0];
        let train = [10.0 / 20.0, 8.0 / 20.0];
        assert_eq!(result.folds.len(), 2);
        assert!((result.score.valid - (valid[0] + valid[1]) / 2.0).abs() < EPS);
        assert!((result.score.train - (train[0] + train[1]) / 2.0).abs() < EPS);
        assert!((result.loss - (1.0 - result.score.valid)).abs() < EPS);
    }

    #[test]
    fn constant_metrics_give_extreme_losses() {
        let data = balanced_dataset();
        let mut clf = ConstantClassifier::default();

        let perfect = |_: &[i64], _: &[i64]| 1.0;
        let result = ClassifierOptimizer::new(&mut clf, label_space(), perfect)
            .evaluate_params(&Params::new(), &data, 3, false)
            .unwrap();
        assert_eq!(result.loss, 0.0);

        let useless = |_: &[i64], _: &[i64]| 0.0;
        let result = ClassifierOptimizer::new(&mut clf, label_space(), useless)
            .evaluate_params(&Params::new(), &data, 2, false)
            .unwrap();
        assert_eq!(result.loss, 1.0);
        assert_eq!(result.folds.len(), 2);
    }

    #[test]
    fn minimize_direction_uses_score_as_loss() {
        let data = balanced_dataset();
        let mut clf = ConstantClassifier::default();
        let error_rate = |t: &[i64], p: &[i64]| 1.0 - accuracy(t, p);
        let mut opt = ClassifierOptimizer::new(&mut clf, label_space(), error_rate)
            .with_direction(ObjectiveDirection::Minimize);

        let result = opt.evaluate_params(&Params::new(), &data, 3, false).unwrap();
        assert!((result.loss - result.score.valid).abs() < EPS);
        assert!((result.loss - 0.5).abs() < EPS);
    }

    #[test]
    fn unknown_parameter_fails_before_training() {
        let data = balanced_dataset();
        let mut clf = ConstantClassifier::default();
        let mut params = Params::new();
        params.insert("depth".into(), ParameterValue::Int(4));

        let err = ClassifierOptimizer::new(&mut clf, label_space(), accuracy::<i64>)
            .evaluate_params(&params, &data, 3, false)
            .unwrap_err();

        assert!(matches!(err, TmleError::Param(ParamError::Unknown { .. })));
        assert_eq!(clf.fits, 0);
    }

    #[test]
    fn split_errors_propagate() {
        let x = Array2::zeros((6, 1));
        let data = Dataset::new(x, vec![0i64, 0, 0, 0, 1, 1]).unwrap();
        let mut clf = ConstantClassifier::default();

        let err = ClassifierOptimizer::new(&mut clf, label_space(), accuracy::<i64>)
            .evaluate_params(&Params::new(), &data, 3, false)
            .unwrap_err();

        assert!(matches!(err, TmleError::Split(SplitError::ClassTooSmall { .. })));
        assert_eq!(clf.fits, 0);
    }

    #[test]
    fn search_respects_evaluation_budget() {
        let data = balanced_dataset();
        let mut clf = ConstantClassifier::default();
        let space = SearchSpace::new().add_int("label", 0, 1);

        ClassifierOptimizer::new(&mut clf, space, accuracy::<i64>)
            .find_best_params(&data, 4, 3, false)
            .unwrap();

        assert_eq!(clf.applied.len(), 4);
        assert_eq!(clf.fits, 4 * 3);
    }

    #[test]
    fn model_keeps_last_candidate_not_best() {
        let data = separable_dataset();
        let mut clf = ConstantClassifier::default();
        // Grid order is label=0 then label=1; the metric prefers label=0.
        let prefers_zero = |_: &[i64], p: &[i64]| if p.iter().all(|&l| l == 0) { 0.9 } else { 0.1 };

        let mut optimizer = Fmin::new(GridSearch::new(label_space(), 2));
        let mut trials = Trials::new();
        let best = ClassifierOptimizer::new(&mut clf, label_space(), prefers_zero)
            .find_best_params_with(
                &data,
                &mut optimizer,
                &StratifiedKFold::new(3),
                &mut trials,
                10,
                false,
            )
            .unwrap();

        assert_eq!(trials.len(), 2);
        assert_eq!(best["label"], ParameterValue::Int(0));
        assert_eq!(clf.get_params()["label"], ParameterValue::Int(1));
    }

    #[test]
    fn configured_search_tunes_knn() {
        let data = separable_dataset();
        let mut knn = KNearestNeighbors::default();
        let space = SearchSpace::new()
            .add_int("n_neighbors", 1, 5)
            .add_choice(
                "weights",
                vec![serde_json::json!("uniform"), serde_json::json!("distance")],
            );
        let config = SearchConfig::new()
            .with_max_evals(6)
            .with_n_splits(3)
            .with_verbose(false)
            .with_seed(17)
            .with_algorithm(SearchAlgorithm::Random);

        let outcome = ClassifierOptimizer::new(&mut knn, space, accuracy::<i64>)
            .search(&data, &config)
            .unwrap();

        assert_eq!(outcome.trials.len(), 6);
        assert_eq!(outcome.best_loss, 0.0);
        assert!(outcome.best_params.contains_key("n_neighbors"));
        assert!(outcome.trials.iter().all(|t| t.result.as_ref().unwrap().folds.len() == 3));
    }

    #[test]
    fn configured_search_rejects_invalid_config() {
        let data = balanced_dataset();
        let mut clf = ConstantClassifier::default();
        let config = SearchConfig::new().with_n_splits(1);

        let err = ClassifierOptimizer::new(&mut clf, label_space(), accuracy::<i64>)
            .search(&data, &config)
            .unwrap_err();
        assert!(err.to_string().contains("n_splits"));
        assert_eq!(clf.fits, 0);
    }
}
