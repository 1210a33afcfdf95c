use std::{error::Error, fmt, io};

use crate::NodeId;

/// The result type used in the entire flock module.
pub type Result<T> = std::result::Result<T, FlockErr>;

/// Failures produced while building or loading a `Flock`.
#[derive(Debug)]
pub enum FlockErr {
    /// The topology has no nodes at all.
    EmptyFlock,
    /// Every node has a parent, so there is no root to lead the flock.
    NoLeader,
    /// More than one node has no parent.
    MultipleLeaders { first: NodeId, second: NodeId },
    /// The same id was declared twice.
    DuplicateNode(NodeId),
    /// An edge references an id that was never declared.
    UnknownNode(NodeId),
    /// A node is listed as a child of two different parents.
    MultipleParents {
        node: NodeId,
        first: NodeId,
        second: NodeId,
    },
    /// A node is its own ancestor.
    Cycle(NodeId),
    Json(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for FlockErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlockErr::EmptyFlock => write!(f, "the flock has no nodes"),
            FlockErr::NoLeader => write!(f, "the flock has no root node to act as leader"),
            FlockErr::MultipleLeaders { first, second } => {
                write!(f, "the flock has more than one root: {first} and {second}")
            }
            FlockErr::DuplicateNode(idx) => write!(f, "node {idx} was declared twice"),
            FlockErr::UnknownNode(idx) => write!(f, "node {idx} is referenced but never declared"),
            FlockErr::MultipleParents {
                node,
                first,
                second,
            } => write!(
                f,
                "node {node} has more than one parent: {first} and {second}"
            ),
            FlockErr::Cycle(idx) => write!(f, "node {idx} is part of a cycle"),
            FlockErr::Json(e) => write!(f, "invalid topology json: {e}"),
            FlockErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for FlockErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FlockErr::Json(e) => Some(e),
            FlockErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FlockErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for FlockErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
