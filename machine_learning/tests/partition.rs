use std::{collections::BTreeSet, sync::Arc};

use flock::Flock;
use machine_learning::{
    MlErr,
    data::{Dataset, FederatedDataset, InMemoryDataset, SplitConfig, federated_split, label_histogram},
};
use ndarray::Array2;
use rand::{SeedableRng, rngs::StdRng};

fn balanced(n: usize, num_labels: usize) -> Arc<InMemoryDataset> {
    let labels: Vec<_> = (0..n).map(|i| i % num_labels).collect();
    let x = Array2::from_shape_fn((n, 1), |(i, _)| labels[i] as f32);
    Arc::new(InMemoryDataset::new(x, labels).unwrap())
}

/// Fraction of assigned samples that carry their worker's majority label.
fn purity(split: &FederatedDataset<InMemoryDataset>, num_labels: usize) -> f64 {
    let mut majority = 0;
    let mut total = 0;

    for subset in split.values() {
        let hist = label_histogram(subset, num_labels).unwrap();
        majority += hist.iter().max().copied().unwrap_or(0);
        total += subset.len();
    }

    majority as f64 / total as f64
}

#[test]
fn subsets_never_share_an_index() {
    let data = balanced(500, 4);
    let flock = Flock::two_tier(2, 3);

    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = SplitConfig::new(4).with_samples_alpha(0.5).with_labels_alpha(0.5);
        let split = federated_split(Arc::clone(&data), &flock, &config, &mut rng).unwrap();

        let workers: Vec<_> = flock.workers().map(|w| w.idx).collect();
        assert_eq!(split.keys().copied().collect::<Vec<_>>(), workers);

        let mut seen = BTreeSet::new();
        for subset in split.values() {
            for &i in subset.indices() {
                assert!(i < data.len());
                assert!(seen.insert(i), "index {i} assigned twice");
            }
        }
    }
}

#[test]
fn subsets_follow_the_source_order() {
    let data = balanced(200, 2);
    let mut rng = StdRng::seed_from_u64(3);

    let split = federated_split(data, &Flock::star(3), &SplitConfig::new(2), &mut rng).unwrap();

    for subset in split.values() {
        assert!(subset.indices().windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn tiny_labels_alpha_separates_labels() {
    let data = balanced(200, 2);
    let flock = Flock::star(2);
    let mut rng = StdRng::seed_from_u64(42);

    let mean_purity = |labels_alpha: f64, rng: &mut StdRng| {
        let config = SplitConfig::new(2)
            .with_samples_alpha(1000.)
            .with_labels_alpha(labels_alpha);

        let trials = 60;
        (0..trials)
            .map(|_| {
                let split = federated_split(Arc::clone(&data), &flock, &config, rng).unwrap();
                purity(&split, 2)
            })
            .sum::<f64>()
            / trials as f64
    };

    let skewed = mean_purity(1e-3, &mut rng);
    let iid = mean_purity(1000., &mut rng);

    assert!(skewed > 0.65, "skewed purity {skewed}");
    assert!(iid < 0.6, "iid purity {iid}");
}

#[test]
fn quotas_truncate_and_leftovers_are_dropped() {
    let n = 101;
    let data = balanced(n, 3);
    let flock = Flock::star(7);
    let config = SplitConfig::new(3).with_samples_alpha(0.3);

    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let split = federated_split(Arc::clone(&data), &flock, &config, &mut rng).unwrap();

        // Every quota loses less than one sample to truncation.
        let assigned: usize = split.values().map(|s| s.len()).sum();
        assert!(assigned < n, "seed {seed}: all {n} samples were assigned");
        assert!(assigned > n - 7, "seed {seed}: only {assigned} samples assigned");
    }
}

/// Mean share of the samples held by the largest subset.
fn mean_largest_share(samples_alpha: f64, trials: u64) -> f64 {
    let n = 1000;
    let data = balanced(n, 2);
    let flock = Flock::star(5);
    let config = SplitConfig::new(2).with_samples_alpha(samples_alpha);

    let total: f64 = (0..trials)
        .map(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let split = federated_split(Arc::clone(&data), &flock, &config, &mut rng).unwrap();
            let largest = split.values().map(|s| s.len()).max().unwrap_or(0);
            largest as f64 / n as f64
        })
        .sum();

    total / trials as f64
}

#[test]
fn tiny_samples_alpha_skews_subset_sizes() {
    let skewed = mean_largest_share(0.1, 30);
    let even = mean_largest_share(100.0, 30);

    assert!(skewed > 0.5, "largest share {skewed}");
    assert!(even < 0.3, "largest share {even}");
}

#[test]
fn labels_out_of_range_fail() {
    let data = balanced(10, 3);
    let mut rng = StdRng::seed_from_u64(0);

    let res = federated_split(data, &Flock::star(2), &SplitConfig::new(2), &mut rng);
    assert!(matches!(
        res,
        Err(MlErr::InvalidLabel {
            label: 2,
            num_labels: 2
        })
    ));
}

#[test]
fn non_positive_alphas_fail() {
    let data = balanced(10, 2);
    let mut rng = StdRng::seed_from_u64(0);

    let config = SplitConfig::new(2).with_samples_alpha(0.);
    let res = federated_split(data, &Flock::star(2), &config, &mut rng);
    assert!(matches!(res, Err(MlErr::InvalidParameter { .. })));
}

#[test]
fn a_lone_leader_gets_nothing() {
    let data = balanced(10, 2);
    let mut rng = StdRng::seed_from_u64(0);

    let split = federated_split(data, &Flock::star(0), &SplitConfig::new(2), &mut rng).unwrap();
    assert!(split.is_empty());
}
