use flock::{AggregatorState, FlockNode};
use log::debug;
use machine_learning::{
    Result, StateDict, average_state_dicts, training::TrainHooks, weighted_average_state_dicts,
};

use crate::{
    ChildUpdate, FedSgd, Strategy,
    selection::{SeedPolicy, SelectionConfig},
};

/// Federated averaging.
///
/// Selects children like `FedSgd` but weighs every child's parameters by the
/// amount of samples they were trained on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FedAvg {
    sampling: FedSgd,
}

impl FedAvg {
    /// Creates a new `FedAvg` strategy drawing from OS entropy.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the participation rate is not in `(0, 1]`.
    pub fn new(selection: SelectionConfig) -> Result<Self> {
        Ok(Self {
            sampling: FedSgd::new(selection)?,
        })
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            sampling: self.sampling.with_seed(seed),
        }
    }

    pub fn with_seed_policy(self, seed_policy: SeedPolicy) -> Self {
        Self {
            sampling: self.sampling.with_seed_policy(seed_policy),
        }
    }
}

impl TrainHooks for FedAvg {}

impl Strategy for FedAvg {
    fn on_worker_selection<'a>(
        &self,
        state: &AggregatorState,
        children: &[&'a FlockNode],
    ) -> Result<Vec<&'a FlockNode>> {
        self.sampling.on_worker_selection(state, children)
    }

    /// Falls back to an unweighted average when no child trained on anything.
    fn on_param_aggregation(
        &self,
        state: &AggregatorState,
        updates: &[ChildUpdate],
    ) -> Result<StateDict> {
        if updates.iter().all(|u| u.num_samples == 0) {
            debug!(node = state.idx.0; "no samples to weigh by, averaging uniformly");
            return average_state_dicts(updates.iter().map(|u| &u.state_dict));
        }

        weighted_average_state_dicts(
            updates
                .iter()
                .map(|u| (&u.state_dict, u.num_samples as f32)),
        )
    }
}
