use std::{collections::BTreeMap, sync::Arc};

use flock::{Flock, NodeId};
use log::{debug, info, warn};
use rand::{Rng, distr::weighted::WeightedIndex};
use rand_distr::{Distribution, Gamma};

use super::{Dataset, Subset};
use crate::{MlErr, Result};

/// The per worker datasets of a federated run.
pub type FederatedDataset<D> = BTreeMap<NodeId, Subset<D>>;

/// Controls how skewed a federated split is.
///
/// Both alphas parametrize symmetric Dirichlet distributions: values near `0`
/// give extreme skew (workers with almost no samples or almost no samples of
/// some label) while `1.0` approaches a uniform allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    pub num_labels: usize,
    pub samples_alpha: f64,
    pub labels_alpha: f64,
}

impl SplitConfig {
    pub fn new(num_labels: usize) -> Self {
        Self {
            num_labels,
            samples_alpha: 1.0,
            labels_alpha: 1.0,
        }
    }

    pub fn with_samples_alpha(mut self, alpha: f64) -> Self {
        self.samples_alpha = alpha;
        self
    }

    pub fn with_labels_alpha(mut self, alpha: f64) -> Self {
        self.labels_alpha = alpha;
        self
    }

    /// # Errors
    /// Returns `InvalidParameter` if there are no labels or an alpha is not strictly positive.
    pub fn validate(&self) -> Result<()> {
        if self.num_labels == 0 {
            return Err(MlErr::InvalidParameter {
                what: "num_labels",
                value: 0.,
            });
        }

        check_alpha("samples_alpha", self.samples_alpha)?;
        check_alpha("labels_alpha", self.labels_alpha)
    }
}

fn check_alpha(what: &'static str, alpha: f64) -> Result<()> {
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(MlErr::InvalidParameter { what, value: alpha });
    }

    Ok(())
}

/// Splits a dataset across the workers of a flock, using two Dirichlet draws to
/// control non-IID-ness along the sample count and the label mix.
///
/// Each worker first gets a quota, the truncated share of a Dirichlet draw over
/// workers, and a label distribution drawn from a second Dirichlet. The dataset
/// is then scanned once in source order. Each sample goes to one of the workers
/// still under quota, drawn with probability proportional to how likely that
/// worker is to hold the sample's label. Once every quota is met the remaining
/// samples are left out of every subset.
///
/// # Arguments
/// * `data` - The centralized dataset.
/// * `flock` - The topology whose workers receive the subsets.
/// * `config` - Number of labels and the two alphas.
/// * `rng` - The source of randomness for every draw.
///
/// # Returns
/// One subset per worker, possibly empty, with no source index in two subsets.
///
/// # Errors
/// Returns `InvalidParameter` for an invalid config, `InvalidLabel` if a sample's
/// label is outside `0..num_labels` and `Data` if the dataset fails to yield a label.
pub fn federated_split<D, R>(
    data: Arc<D>,
    flock: &Flock,
    config: &SplitConfig,
    rng: &mut R,
) -> Result<FederatedDataset<D>>
where
    D: Dataset,
    R: Rng + ?Sized,
{
    config.validate()?;

    let workers: Vec<_> = flock.workers().map(|w| w.idx).collect();
    if workers.is_empty() {
        warn!("the flock has no workers, nothing to split");
        return Ok(BTreeMap::new());
    }

    let total = data.len();
    let quotas: Vec<usize> = dirichlet(workers.len(), config.samples_alpha, rng)?
        .into_iter()
        .map(|share| (share * total as f64) as usize)
        .collect();

    let label_probs = (0..workers.len())
        .map(|_| dirichlet(config.num_labels, config.labels_alpha, rng))
        .collect::<Result<Vec<_>>>()?;

    debug!("worker sample quotas: {quotas:?}");

    let mut indices = vec![Vec::new(); workers.len()];
    let mut eligible = Vec::with_capacity(workers.len());
    let mut weights = Vec::with_capacity(workers.len());
    let mut dropped = 0;

    for idx in 0..total {
        let label = data.label(idx)?;
        if label >= config.num_labels {
            return Err(MlErr::InvalidLabel {
                label,
                num_labels: config.num_labels,
            });
        }

        eligible.clear();
        weights.clear();
        for (w, quota) in quotas.iter().enumerate() {
            if indices[w].len() < *quota {
                eligible.push(w);
                weights.push(label_probs[w][label]);
            }
        }

        if eligible.is_empty() {
            dropped += 1;
            continue;
        }

        let chosen = eligible[pick(&weights, rng)];
        indices[chosen].push(idx);
    }

    if dropped > 0 {
        warn!("{dropped} of {total} samples were left unassigned, every worker met its quota");
    }

    info!(
        samples = total,
        workers = workers.len(),
        dropped = dropped;
        "split dataset across workers"
    );

    let subsets = workers
        .into_iter()
        .zip(indices)
        .map(|(w, idxs)| (w, Subset::new(Arc::clone(&data), idxs)))
        .collect();

    Ok(subsets)
}

/// Counts how many samples of each label a dataset holds.
///
/// # Errors
/// Returns `InvalidLabel` if a label is outside `0..num_labels`.
pub fn label_histogram<D: Dataset + ?Sized>(data: &D, num_labels: usize) -> Result<Vec<usize>> {
    let mut counts = vec![0; num_labels];

    for idx in 0..data.len() {
        let label = data.label(idx)?;
        let slot = counts
            .get_mut(label)
            .ok_or(MlErr::InvalidLabel { label, num_labels })?;
        *slot += 1;
    }

    Ok(counts)
}

/// Draws a probability vector of length `k` from a symmetric Dirichlet.
///
/// Sampled as normalized Gamma(alpha, 1) variates. For tiny alphas every gamma
/// can underflow to zero, in which case all the mass goes to a single uniformly
/// drawn component, which is the limit of the distribution.
fn dirichlet<R: Rng + ?Sized>(k: usize, alpha: f64, rng: &mut R) -> Result<Vec<f64>> {
    let gamma = Gamma::new(alpha, 1.0).map_err(|_| MlErr::InvalidParameter {
        what: "dirichlet alpha",
        value: alpha,
    })?;

    let mut draws: Vec<f64> = (0..k).map(|_| gamma.sample(rng)).collect();
    let sum: f64 = draws.iter().sum();

    if sum > 0.0 && sum.is_finite() {
        draws.iter_mut().for_each(|d| *d /= sum);
    } else if k > 0 {
        draws.fill(0.0);
        draws[rng.random_range(0..k)] = 1.0;
    }

    Ok(draws)
}

/// Draws an index with probability proportional to `weights`, falling back to a
/// uniform draw when the weights carry no mass.
fn pick<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    match WeightedIndex::new(weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.random_range(0..weights.len()),
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn dirichlet_draws_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(1);

        for alpha in [0.01, 0.5, 1.0, 10.0] {
            let p = dirichlet(6, alpha, &mut rng).unwrap();
            assert_eq!(p.len(), 6);
            assert!(p.iter().all(|&x| (0.0..=1.0).contains(&x)));
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn vanishing_alpha_degenerates_to_one_hot() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = dirichlet(4, 1e-300, &mut rng).unwrap();

        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(p.iter().filter(|&&x| x > 0.99).count(), 1);
    }

    #[test]
    fn pick_ignores_zero_weights() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            assert_eq!(pick(&[0.0, 1.0, 0.0], &mut rng), 1);
        }
    }

    #[test]
    fn pick_without_mass_is_uniform() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut hits = [0; 3];
        for _ in 0..300 {
            hits[pick(&[0.0, 0.0, 0.0], &mut rng)] += 1;
        }

        assert!(hits.iter().all(|&h| h > 50));
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(SplitConfig::new(0).validate().is_err());
        assert!(SplitConfig::new(2).with_samples_alpha(0.0).validate().is_err());
        assert!(SplitConfig::new(2).with_labels_alpha(-1.0).validate().is_err());
        assert!(
            SplitConfig::new(2)
                .with_labels_alpha(f64::NAN)
                .validate()
                .is_err()
        );
        assert!(SplitConfig::new(2).validate().is_ok());
    }
}
