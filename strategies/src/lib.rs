//! Federated learning strategies: which children take part in a round and how
//! their parameters are merged back together.

mod fedavg;
mod fedsgd;
mod registry;
pub mod selection;
mod strategy;

pub use fedavg::FedAvg;
pub use fedsgd::FedSgd;
pub use registry::{SamplingSpec, Strategies, StrategySpec};
pub use selection::{SeedPolicy, SelectionConfig, random_worker_selection};
pub use strategy::{ChildUpdate, Strategy};
