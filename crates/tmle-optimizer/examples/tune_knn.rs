//! Tune a k-nearest-neighbours classifier on synthetic data.
//!
//! Run with `RUST_LOG=debug` to see per-trial and per-fold events.

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

use tmle_optimizer::{ClassifierOptimizer, SearchConfig, SearchSpace};
use tmle_types::metrics::balanced_accuracy;
use tmle_types::{format_params, Classifier, Dataset, KNearestNeighbors};

/// Two noisy Gaussian blobs in the plane.
fn blobs(n_per_class: usize, seed: u64) -> anyhow::Result<Dataset<u8>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(2 * n_per_class * 2);
    let mut labels = Vec::with_capacity(2 * n_per_class);
    for (label, center) in [(0u8, (0.0, 0.0)), (1u8, (1.5, 1.5))] {
        for _ in 0..n_per_class {
            rows.push(center.0 + rng.random_range(-1.5..1.5));
            rows.push(center.1 + rng.random_range(-1.5..1.5));
            labels.push(label);
        }
    }
    let features = Array2::from_shape_vec((labels.len(), 2), rows)?;
    Ok(Dataset::new(features, labels)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("tmle: tuning k-nearest-neighbours with cross-validated TPE");

    let data = blobs(60, 7)?;
    println!("Generated {} samples with {} features", data.len(), data.n_features());
    for (label, count) in data.class_counts() {
        println!("  class {label}: {count} samples");
    }

    let space = SearchSpace::new()
        .add_int("n_neighbors", 1, 25)
        .add_choice(
            "weights",
            vec![serde_json::json!("uniform"), serde_json::json!("distance")],
        );

    let config = SearchConfig::from_env()?.with_max_evals(30).with_seed(42);

    let mut knn = KNearestNeighbors::default();
    let outcome = ClassifierOptimizer::new(&mut knn, space, balanced_accuracy::<u8>)
        .search(&data, &config)?;

    println!(
        "Best after {} trials: {} (loss {:.4})",
        outcome.trials.len(),
        format_params(&outcome.best_params),
        outcome.best_loss
    );

    // The model holds the last candidate; re-apply the best one and refit.
    knn.set_params(&outcome.best_params)?;
    knn.fit(data.features(), data.labels())?;
    println!("Refitted with {}", format_params(&knn.get_params()));

    Ok(())
}
