use flock::FlockNode;
use log::{debug, warn};
use machine_learning::{MlErr, Result};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};
use serde::{Deserialize, Serialize};

/// How an aggregator samples the children taking part in a round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// The fraction of children to select, in `(0, 1]`.
    pub participation: f64,
    /// Whether to flip a coin per child instead of drawing a fixed amount of them.
    pub probabilistic: bool,
    /// Whether children with children of their own are always selected.
    pub always_include_aggregators: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            participation: 1.0,
            probabilistic: true,
            always_include_aggregators: true,
        }
    }
}

impl SelectionConfig {
    /// # Errors
    /// Returns `InvalidParameter` if `participation` is not in `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let p = self.participation;
        if !(p > 0.0 && p <= 1.0) {
            return Err(MlErr::InvalidParameter {
                what: "participation",
                value: p,
            });
        }

        Ok(())
    }

    /// The amount of children a deterministic selection picks out of `n`.
    ///
    /// Rounds half to even, but never below one unless there is nothing to pick.
    pub fn sample_size(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }

        let k = (self.participation * n as f64).round_ties_even() as usize;
        k.clamp(1, n)
    }
}

/// Where the randomness of each round's selection comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// Reuse the same seed every round, so a seeded deterministic selection
    /// picks the same children over and over.
    #[default]
    Fixed,
    /// Offset the seed by the round number.
    PerRound,
}

impl SeedPolicy {
    /// Builds the generator for a round. Without a seed it draws from the OS.
    pub fn rng(&self, seed: Option<u64>, round: usize) -> StdRng {
        match (seed, self) {
            (Some(seed), SeedPolicy::Fixed) => StdRng::seed_from_u64(seed),
            (Some(seed), SeedPolicy::PerRound) => {
                StdRng::seed_from_u64(seed.wrapping_add(round as u64))
            }
            (None, _) => StdRng::from_os_rng(),
        }
    }
}

/// Randomly selects the children that take part in a round.
///
/// # Arguments
/// * `children` - The candidates, usually the children of an aggregator.
/// * `config` - The participation rate and sampling mode.
/// * `rng` - The source of randomness.
///
/// # Returns
/// The selected children in their original order. Probabilistic selections may
/// be empty.
///
/// # Errors
/// Returns `InvalidParameter` if the participation rate is not in `(0, 1]`.
pub fn random_worker_selection<'a, R>(
    children: &[&'a FlockNode],
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<Vec<&'a FlockNode>>
where
    R: Rng + ?Sized,
{
    config.validate()?;

    let n = children.len();
    let mut chosen = vec![false; n];

    if config.probabilistic {
        chosen
            .iter_mut()
            .for_each(|c| *c = rng.random_bool(config.participation));
    } else {
        let k = config.sample_size(n);
        index::sample(rng, n, k)
            .into_iter()
            .for_each(|i| chosen[i] = true);
    }

    if config.always_include_aggregators {
        for (c, child) in chosen.iter_mut().zip(children) {
            *c |= !child.children.is_empty();
        }
    }

    let selected: Vec<_> = children
        .iter()
        .zip(&chosen)
        .filter_map(|(&child, &c)| c.then_some(child))
        .collect();

    if selected.is_empty() && n > 0 {
        warn!("no child was selected out of {n}");
    } else {
        debug!(candidates = n, selected = selected.len(); "selected children");
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use flock::{NodeId, NodeKind};

    use super::*;

    fn workers(n: usize) -> Vec<FlockNode> {
        (1..=n)
            .map(|i| FlockNode {
                idx: NodeId(i),
                kind: NodeKind::Worker,
                children: vec![],
            })
            .collect()
    }

    fn refs(nodes: &[FlockNode]) -> Vec<&FlockNode> {
        nodes.iter().collect()
    }

    fn deterministic(participation: f64) -> SelectionConfig {
        SelectionConfig {
            participation,
            probabilistic: false,
            always_include_aggregators: false,
        }
    }

    #[test]
    fn sample_size_rounds_half_to_even() {
        assert_eq!(deterministic(0.5).sample_size(5), 2);
        assert_eq!(deterministic(0.5).sample_size(7), 4);
        assert_eq!(deterministic(0.3).sample_size(10), 3);
        assert_eq!(deterministic(0.01).sample_size(10), 1);
        assert_eq!(deterministic(1.0).sample_size(10), 10);
        assert_eq!(deterministic(1.0).sample_size(0), 0);
    }

    #[test]
    fn full_participation_keeps_everyone() {
        let nodes = workers(6);
        let mut rng = StdRng::seed_from_u64(0);

        let selected = random_worker_selection(&refs(&nodes), &deterministic(1.0), &mut rng).unwrap();
        assert_eq!(selected, refs(&nodes));
    }

    #[test]
    fn deterministic_selection_has_a_fixed_size_and_keeps_order() {
        let nodes = workers(10);
        let mut rng = StdRng::seed_from_u64(1);

        let selected = random_worker_selection(&refs(&nodes), &deterministic(0.4), &mut rng).unwrap();

        assert_eq!(selected.len(), 4);
        assert!(selected.windows(2).all(|w| w[0].idx < w[1].idx));
    }

    #[test]
    fn tiny_participation_still_selects_one() {
        let nodes = workers(10);
        let mut rng = StdRng::seed_from_u64(2);

        let selected = random_worker_selection(&refs(&nodes), &deterministic(1e-9), &mut rng).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn probabilistic_selection_may_be_empty() {
        let nodes = workers(3);
        let config = SelectionConfig {
            participation: 1e-9,
            probabilistic: true,
            always_include_aggregators: false,
        };
        let mut rng = StdRng::seed_from_u64(3);

        let selected = random_worker_selection(&refs(&nodes), &config, &mut rng).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn aggregators_are_always_included_once() {
        let mut nodes = workers(4);
        nodes[1].kind = NodeKind::Aggregator;
        nodes[1].children = vec![NodeId(10)];
        nodes[3].kind = NodeKind::Aggregator;
        nodes[3].children = vec![NodeId(11)];

        let config = SelectionConfig {
            participation: 1e-9,
            probabilistic: false,
            always_include_aggregators: true,
        };

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = random_worker_selection(&refs(&nodes), &config, &mut rng).unwrap();

            let aggs: Vec<_> = selected.iter().filter(|n| n.is_aggregator()).collect();
            assert_eq!(aggs.len(), 2);
            assert!(selected.len() <= 3);
        }
    }

    #[test]
    fn empty_children_select_nothing() {
        let mut rng = StdRng::seed_from_u64(4);
        let selected = random_worker_selection(&[], &deterministic(0.5), &mut rng).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn participation_out_of_range_fails() {
        let nodes = workers(2);
        let mut rng = StdRng::seed_from_u64(5);

        for p in [0.0, -0.5, 1.5, f64::NAN] {
            let res = random_worker_selection(&refs(&nodes), &deterministic(p), &mut rng);
            assert!(matches!(res, Err(MlErr::InvalidParameter { .. })));
        }
    }

    #[test]
    fn fixed_seeds_repeat_and_per_round_seeds_do_not() {
        let fixed: Vec<u64> = (0..3)
            .map(|round| SeedPolicy::Fixed.rng(Some(9), round).random())
            .collect();
        assert!(fixed.iter().all(|&x| x == fixed[0]));

        let per_round: Vec<u64> = (0..3)
            .map(|round| SeedPolicy::PerRound.rng(Some(9), round).random())
            .collect();
        assert_ne!(per_round[0], per_round[1]);
        assert_ne!(per_round[1], per_round[2]);
    }
}
