//! Topology of a simulated federated learning run: who leads, who aggregates
//! and who trains.

mod error;
mod flock;
mod node;
mod state;

pub use error::{FlockErr, Result};
pub use flock::{Flock, FlockBuilder, NodeSpec, TopologySpec};
pub use node::{FlockNode, NodeId, NodeKind};
pub use state::{AggregatorState, WorkerState};
