use flock::{AggregatorState, FlockNode};
use machine_learning::{Result, training::TrainHooks};

use crate::{
    Strategy,
    selection::{SeedPolicy, SelectionConfig, random_worker_selection},
};

/// Federated stochastic gradient descent.
///
/// Samples a random subset of children every round and merges their
/// parameters with the default unweighted average of `Strategy`.
///
/// > McMahan, Brendan, et al. "Communication-efficient learning of deep networks
/// > from decentralized data." Artificial intelligence and statistics. PMLR, 2017.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FedSgd {
    selection: SelectionConfig,
    seed: Option<u64>,
    seed_policy: SeedPolicy,
}

impl FedSgd {
    /// Creates a new `FedSgd` strategy drawing from OS entropy.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the participation rate is not in `(0, 1]`.
    pub fn new(selection: SelectionConfig) -> Result<Self> {
        selection.validate()?;

        Ok(Self {
            selection,
            seed: None,
            seed_policy: SeedPolicy::default(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_seed_policy(mut self, seed_policy: SeedPolicy) -> Self {
        self.seed_policy = seed_policy;
        self
    }

    #[inline]
    pub fn selection(&self) -> &SelectionConfig {
        &self.selection
    }

    #[inline]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    #[inline]
    pub fn seed_policy(&self) -> SeedPolicy {
        self.seed_policy
    }
}

impl TrainHooks for FedSgd {}

impl Strategy for FedSgd {
    fn on_worker_selection<'a>(
        &self,
        state: &AggregatorState,
        children: &[&'a FlockNode],
    ) -> Result<Vec<&'a FlockNode>> {
        let mut rng = self.seed_policy.rng(self.seed, state.round);
        random_worker_selection(children, &self.selection, &mut rng)
    }
}
