use std::{env, fs, process, sync::Arc};

use flock::Flock;
use log::{error, info};
use machine_learning::{
    arch::{Module, SoftmaxRegression},
    data::{InMemoryDataset, SplitConfig, federated_split, label_histogram},
};
use ndarray::Array2;
use orchestrator::{
    OrchestratorError, Result,
    configs::{FitConfig, OptimizerConfig},
    sync_federated_fit,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use strategies::Strategies;

const NUM_FEATURES: usize = 2;
const NUM_LABELS: usize = 3;
const SAMPLES_PER_LABEL: usize = 200;
const DEMO_SEED: u64 = 0;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        error!("{e}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = match env::var("FIT_CONFIG") {
        Ok(path) => FitConfig::from_json_file(path)?,
        Err(_) => FitConfig {
            num_global_rounds: 5,
            seed: Some(DEMO_SEED),
            optimizer: OptimizerConfig::GradientDescent { learning_rate: 0.5 },
            ..Default::default()
        },
    };

    let flock = match env::var("FLOCK_PATH") {
        Ok(path) => Flock::from_json_file(path)?,
        Err(_) => Flock::two_tier(2, 4),
    };
    info!(
        nodes = flock.len(),
        workers = flock.workers().count();
        "loaded flock"
    );

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(DEMO_SEED));
    let data = Arc::new(gaussian_blobs(&mut rng)?);

    let split = SplitConfig::new(NUM_LABELS).with_labels_alpha(0.5);
    let datasets = federated_split(Arc::clone(&data), &flock, &split, &mut rng)?;
    for (idx, subset) in &datasets {
        let histogram = label_histogram(subset, NUM_LABELS)?;
        info!("worker {idx} holds {histogram:?}");
    }

    let strategy = Strategies::from_spec(&config.strategy)?;
    info!(strategy = strategy.kind(); "starting federated fit");

    let model_factory = || SoftmaxRegression::new(NUM_FEATURES, NUM_LABELS);
    let result = sync_federated_fit(&flock, model_factory, &datasets, &config, &strategy)?;

    let mut model = model_factory();
    model.load_state_dict(&result.state_dict)?;
    let predictions = model.predict(data.features().view())?;
    let hits = predictions
        .iter()
        .zip(data.labels())
        .filter(|(p, y)| p == y)
        .count();
    let accuracy = hits as f64 / data.labels().len() as f64;

    if let Ok(path) = env::var("HISTORY_OUT") {
        let json = result.history.to_json_string()?;
        fs::write(&path, json)?;
        info!("wrote history to {path}");
    }

    println!(
        "trained {} round(s) with {}: {} records, accuracy {:.3}",
        config.num_global_rounds,
        strategy.kind(),
        result.history.len(),
        accuracy
    );

    Ok(())
}

/// One isotropic gaussian blob per label, centered on the vertices of a triangle.
fn gaussian_blobs<R: Rng>(rng: &mut R) -> Result<InMemoryDataset> {
    let centers = [[0.0, 3.0], [-3.0, -2.0], [3.0, -2.0]];
    let noise = Normal::new(0.0f32, 1.0)
        .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;

    let n = NUM_LABELS * SAMPLES_PER_LABEL;
    let mut features = Array2::zeros((n, NUM_FEATURES));
    let mut labels = Vec::with_capacity(n);

    for (i, mut row) in features.rows_mut().into_iter().enumerate() {
        let label = i % NUM_LABELS;
        for (x, c) in row.iter_mut().zip(centers[label]) {
            *x = c + noise.sample(rng);
        }
        labels.push(label);
    }

    Ok(InMemoryDataset::new(features, labels)?)
}
