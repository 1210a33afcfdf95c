use flock::{AggregatorState, FlockNode, WorkerState};
use machine_learning::{Result, StateDict, arch::Loss, training::TrainHooks};
use serde::{Deserialize, Serialize};

use crate::{
    ChildUpdate, FedAvg, FedSgd, Strategy,
    selection::{SeedPolicy, SelectionConfig},
};

/// The sampling knobs shared by every built in strategy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSpec {
    #[serde(flatten)]
    pub selection: SelectionConfig,
    pub seed: Option<u64>,
    pub seed_policy: SeedPolicy,
}

/// The specification for a built in strategy.
///
/// Externally tagged, e.g. `{"fedavg": {"participation": 0.5, "seed": 7}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategySpec {
    FedSgd(SamplingSpec),
    FedAvg(SamplingSpec),
}

impl Default for StrategySpec {
    fn default() -> Self {
        Self::FedSgd(SamplingSpec::default())
    }
}

/// A runtime selectable `Strategy` covering every built in algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategies {
    FedSgd(FedSgd),
    FedAvg(FedAvg),
}

impl Strategies {
    /// Builds a strategy from its specification.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the participation rate is not in `(0, 1]`.
    pub fn from_spec(spec: &StrategySpec) -> Result<Self> {
        Ok(match spec {
            StrategySpec::FedSgd(s) => {
                let mut fedsgd = FedSgd::new(s.selection)?.with_seed_policy(s.seed_policy);
                if let Some(seed) = s.seed {
                    fedsgd = fedsgd.with_seed(seed);
                }
                Self::FedSgd(fedsgd)
            }
            StrategySpec::FedAvg(s) => {
                let mut fedavg = FedAvg::new(s.selection)?.with_seed_policy(s.seed_policy);
                if let Some(seed) = s.seed {
                    fedavg = fedavg.with_seed(seed);
                }
                Self::FedAvg(fedavg)
            }
        })
    }

    /// Looks up a strategy by name, with default parameters.
    ///
    /// # Returns
    /// `None` if no built in strategy goes by `name`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fedsgd" => Some(Self::FedSgd(FedSgd::default())),
            "fedavg" => Some(Self::FedAvg(FedAvg::default())),
            _ => None,
        }
    }

    /// Returns a stable identifier for the strategy kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Strategies::FedSgd(_) => "fedsgd",
            Strategies::FedAvg(_) => "fedavg",
        }
    }
}

impl TrainHooks for Strategies {
    fn before_backprop(&self, state: &WorkerState, loss: Loss) -> Loss {
        match self {
            Strategies::FedSgd(s) => s.before_backprop(state, loss),
            Strategies::FedAvg(s) => s.before_backprop(state, loss),
        }
    }

    fn after_backprop(&self, state: &WorkerState, loss: Loss) -> Loss {
        match self {
            Strategies::FedSgd(s) => s.after_backprop(state, loss),
            Strategies::FedAvg(s) => s.after_backprop(state, loss),
        }
    }
}

impl Strategy for Strategies {
    fn on_worker_selection<'a>(
        &self,
        state: &AggregatorState,
        children: &[&'a FlockNode],
    ) -> Result<Vec<&'a FlockNode>> {
        match self {
            Strategies::FedSgd(s) => s.on_worker_selection(state, children),
            Strategies::FedAvg(s) => s.on_worker_selection(state, children),
        }
    }

    fn on_param_aggregation(
        &self,
        state: &AggregatorState,
        updates: &[ChildUpdate],
    ) -> Result<StateDict> {
        match self {
            Strategies::FedSgd(s) => s.on_param_aggregation(state, updates),
            Strategies::FedAvg(s) => s.on_param_aggregation(state, updates),
        }
    }
}
