use flock::{AggregatorState, FlockNode, NodeId};
use machine_learning::{Result, StateDict, average_state_dicts, training::TrainHooks};

/// What a child hands back to its parent at the end of a round.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildUpdate {
    pub idx: NodeId,
    pub state_dict: StateDict,
    /// The amount of samples the parameters were trained on, summed over the
    /// whole subtree for aggregators.
    pub num_samples: usize,
}

/// The set of callbacks that make up a federated learning algorithm.
///
/// The worker side callbacks come from `TrainHooks`. Every callback has a
/// default, so an implementation only overrides the ones it customizes.
pub trait Strategy: TrainHooks {
    /// Picks the children of an aggregator that take part in the round.
    /// Defaults to all of them.
    ///
    /// # Errors
    /// Implementation defined, aborts the round.
    fn on_worker_selection<'a>(
        &self,
        _state: &AggregatorState,
        children: &[&'a FlockNode],
    ) -> Result<Vec<&'a FlockNode>> {
        Ok(children.to_vec())
    }

    /// Merges the parameters trained by the children of an aggregator.
    /// Defaults to their unweighted average.
    ///
    /// # Errors
    /// Returns an error if there are no updates or they don't share keys and shapes.
    fn on_param_aggregation(
        &self,
        _state: &AggregatorState,
        updates: &[ChildUpdate],
    ) -> Result<StateDict> {
        average_state_dicts(updates.iter().map(|u| &u.state_dict))
    }
}
