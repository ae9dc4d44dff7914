//! Higher-is-better classification scores in `[0, 1]`.
//!
//! Every metric has the signature `fn(y_true, y_pred) -> f64` so it can be
//! handed to the search driver directly. Empty input scores 0.

use std::collections::BTreeMap;

/// Fraction of predictions equal to the true label.
pub fn accuracy<L: PartialEq>(y_true: &[L], y_pred: &[L]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Per-class (true positives, false positives, false negatives).
fn class_tallies<L: Ord + Clone>(y_true: &[L], y_pred: &[L]) -> BTreeMap<L, (usize, usize, usize)> {
    let mut tallies: BTreeMap<L, (usize, usize, usize)> = BTreeMap::new();
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        if t == p {
            tallies.entry(t.clone()).or_default().0 += 1;
        } else {
            tallies.entry(p.clone()).or_default().1 += 1;
            tallies.entry(t.clone()).or_default().2 += 1;
        }
    }
    tallies
}

/// Mean per-class recall over the classes present in `y_true`.
pub fn balanced_accuracy<L: Ord + Clone>(y_true: &[L], y_pred: &[L]) -> f64 {
    let recalls: Vec<f64> = class_tallies(y_true, y_pred)
        .values()
        .filter(|(tp, _, fn_)| tp + fn_ > 0)
        .map(|(tp, _, fn_)| *tp as f64 / (tp + fn_) as f64)
        .collect();
    if recalls.is_empty() {
        return 0.0;
    }
    recalls.iter().sum::<f64>() / recalls.len() as f64
}

/// Unweighted mean of per-class F1 over every label seen in either input.
pub fn f1_macro<L: Ord + Clone>(y_true: &[L], y_pred: &[L]) -> f64 {
    let tallies = class_tallies(y_true, y_pred);
    if tallies.is_empty() {
        return 0.0;
    }
    let total: f64 = tallies
        .values()
        .map(|(tp, fp, fn_)| {
            let denom = 2 * tp + fp + fn_;
            if denom == 0 {
                0.0
            } else {
                (2 * tp) as f64 / denom as f64
            }
        })
        .sum();
    total / tallies.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn accuracy_counts_matches() {
        assert!((accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]) - 0.75).abs() < EPS);
        assert_eq!(accuracy::<u8>(&[], &[]), 0.0);
    }

    #[test]
    fn balanced_accuracy_averages_recall() {
        // class 0 recall 1.0, class 1 recall 0.5
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 0, 1, 0];
        assert!((balanced_accuracy(&y_true, &y_pred) - 0.75).abs() < EPS);
    }

    #[test]
    fn balanced_accuracy_penalizes_majority_guess() {
        let y_true = [0, 0, 0, 1];
        let y_pred = [0, 0, 0, 0];
        assert!((accuracy(&y_true, &y_pred) - 0.75).abs() < EPS);
        assert!((balanced_accuracy(&y_true, &y_pred) - 0.5).abs() < EPS);
    }

    #[test]
    fn f1_macro_perfect_and_partial() {
        assert!((f1_macro(&["a", "b"], &["a", "b"]) - 1.0).abs() < EPS);

        // class 0: tp=2 fp=1 fn=0 -> 0.8 ; class 1: tp=1 fp=0 fn=1 -> 2/3
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 0, 1, 0];
        let expected = (0.8 + 2.0 / 3.0) / 2.0;
        assert!((f1_macro(&y_true, &y_pred) - expected).abs() < EPS);
    }
}
