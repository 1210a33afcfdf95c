use crate::{NodeId, NodeKind};

/// Identity of the worker currently executing local training.
///
/// Handed to the worker-side hooks so strategies can customize behavior per
/// node without a global lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerState {
    pub idx: NodeId,
    pub parent: Option<NodeId>,
    pub round: usize,
}

impl WorkerState {
    pub fn new(idx: NodeId, parent: Option<NodeId>, round: usize) -> Self {
        Self { idx, parent, round }
    }
}

/// Identity of the leader or aggregator currently selecting children or
/// merging their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorState {
    pub idx: NodeId,
    pub kind: NodeKind,
    pub round: usize,
}

impl AggregatorState {
    pub fn new(idx: NodeId, kind: NodeKind, round: usize) -> Self {
        Self { idx, kind, round }
    }
}
