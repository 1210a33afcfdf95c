use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a node inside a `Flock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// The role a node plays in the hierarchy.
///
/// Roles are derived from the shape of the tree: the root leads, inner nodes
/// aggregate and leaves train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Leader,
    Aggregator,
    Worker,
}

impl NodeKind {
    /// Returns a stable identifier for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Leader => "leader",
            NodeKind::Aggregator => "aggregator",
            NodeKind::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single node of the flock together with its direct children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlockNode {
    pub idx: NodeId,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
}

impl FlockNode {
    #[inline]
    pub fn is_worker(&self) -> bool {
        self.kind == NodeKind::Worker
    }

    /// Whether this node is an intermediate aggregator, i.e. it is not the
    /// leader and it has children of its own.
    #[inline]
    pub fn is_aggregator(&self) -> bool {
        self.kind == NodeKind::Aggregator
    }
}
