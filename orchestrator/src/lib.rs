//! Simulated federated learning over a `Flock`: every round, aggregators sample
//! their children, workers train locally and parameters are merged back up to
//! the leader.

pub mod configs;
pub mod error;
mod sync;

pub use error::{OrchestratorError, Result};
pub use sync::{FitResult, sync_federated_fit};
