use flock::{AggregatorState, Flock, FlockNode, NodeId, WorkerState};
use log::{debug, info, warn};
use machine_learning::{
    StateDict,
    arch::Module,
    data::{DataLoader, Dataset, FederatedDataset},
    optimization::{GradientDescent, GradientDescentWithMomentum},
    training::{Table, Trainer},
};
use rand::{SeedableRng, rngs::StdRng};
use rayon::{ThreadPoolBuilder, prelude::*};
use strategies::{ChildUpdate, Strategy};

use crate::{
    OrchestratorError, Result,
    configs::{FitConfig, OptimizerConfig},
};

/// The outcome of a federated fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// The parameters of the global model after the last round.
    pub state_dict: StateDict,
    /// Every worker's training records, tagged with `round`, `node/idx`,
    /// `node/kind`, `parent/idx` and `parent/kind`.
    pub history: Table,
}

/// What a node hands back to its parent.
struct Outcome {
    update: ChildUpdate,
    history: Table,
}

/// Runs a synchronous federated fit over `flock`.
///
/// Every round walks the flock depth first from the leader. Aggregators let the
/// strategy select which children take part, run the selected subtrees in
/// parallel and merge their parameters with the strategy. Workers train a fresh
/// copy of the global model on their own dataset. The leader's merged
/// parameters become the global model of the next round.
///
/// # Arguments
/// * `flock` - The topology of the run.
/// * `model_factory` - Builds a model with the global architecture.
/// * `datasets` - The local dataset of every worker.
/// * `config` - Rounds, local training and threading knobs.
/// * `strategy` - Selects children and merges their parameters.
///
/// # Errors
/// Returns `InvalidConfig` for an invalid `config`, `MissingDataset` if a
/// selected worker has no dataset and `Ml` for any strategy, trainer or model
/// failure, which aborts the whole run.
pub fn sync_federated_fit<M, F, D, S>(
    flock: &Flock,
    model_factory: F,
    datasets: &FederatedDataset<D>,
    config: &FitConfig,
    strategy: &S,
) -> Result<FitResult>
where
    M: Module,
    F: Fn() -> M + Sync,
    D: Dataset,
    S: Strategy + ?Sized,
{
    config.validate()?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.num_threads.unwrap_or(0))
        .build()?;

    let mut global = model_factory();
    let mut histories = Vec::with_capacity(config.num_global_rounds);

    for round in 0..config.num_global_rounds {
        info!(round = round; "starting round");

        let state_dict = global.state_dict();
        let ctx = Round {
            flock,
            model_factory: &model_factory,
            datasets,
            config,
            strategy,
            global: &state_dict,
            round,
        };

        let outcome = pool.install(|| ctx.visit(flock.leader(), None))?;
        global.load_state_dict(&outcome.update.state_dict)?;

        info!(
            round = round,
            samples = outcome.update.num_samples,
            records = outcome.history.len();
            "finished round"
        );
        histories.push(outcome.history.with_constant("round", round));
    }

    Ok(FitResult {
        state_dict: global.state_dict(),
        history: Table::concat(histories),
    })
}

/// Everything a node needs to take part in a round.
struct Round<'a, F, D, S: ?Sized> {
    flock: &'a Flock,
    model_factory: &'a F,
    datasets: &'a FederatedDataset<D>,
    config: &'a FitConfig,
    strategy: &'a S,
    global: &'a StateDict,
    round: usize,
}

impl<M, F, D, S> Round<'_, F, D, S>
where
    M: Module,
    F: Fn() -> M + Sync,
    D: Dataset,
    S: Strategy + ?Sized,
{
    fn visit(&self, node: &FlockNode, parent: Option<&FlockNode>) -> Result<Outcome> {
        if node.is_worker() {
            self.train(node, parent)
        } else {
            self.aggregate(node)
        }
    }

    fn aggregate(&self, node: &FlockNode) -> Result<Outcome> {
        let state = AggregatorState::new(node.idx, node.kind, self.round);
        let children: Vec<_> = self.flock.children(node.idx).collect();
        let selected = self.strategy.on_worker_selection(&state, &children)?;

        if selected.is_empty() {
            warn!(node = node.idx.0, round = self.round; "no children selected, keeping the global model");
            return Ok(Outcome {
                update: ChildUpdate {
                    idx: node.idx,
                    state_dict: self.global.clone(),
                    num_samples: 0,
                },
                history: Table::new(),
            });
        }

        let outcomes = selected
            .par_iter()
            .map(|child| self.visit(child, Some(node)))
            .collect::<Result<Vec<_>>>()?;

        let (updates, histories): (Vec<_>, Vec<_>) = outcomes
            .into_iter()
            .map(|o| (o.update, o.history))
            .unzip();

        // Children that trained on nothing hand back the stale global model.
        // They only take part when no sibling trained at all.
        let num_samples: usize = updates.iter().map(|u| u.num_samples).sum();
        let contributors: Vec<_> = if num_samples > 0 {
            updates.into_iter().filter(|u| u.num_samples > 0).collect()
        } else {
            updates
        };

        let state_dict = self.strategy.on_param_aggregation(&state, &contributors)?;

        debug!(
            node = node.idx.0,
            selected = selected.len(),
            contributors = contributors.len(),
            samples = num_samples;
            "aggregated children"
        );

        Ok(Outcome {
            update: ChildUpdate {
                idx: node.idx,
                state_dict,
                num_samples,
            },
            history: Table::concat(histories),
        })
    }

    fn train(&self, node: &FlockNode, parent: Option<&FlockNode>) -> Result<Outcome> {
        let data = self
            .datasets
            .get(&node.idx)
            .ok_or(OrchestratorError::MissingDataset { node: node.idx })?;

        let mut model = (self.model_factory)();
        model.load_state_dict(self.global)?;

        let num_samples = data.len();
        if num_samples == 0 {
            debug!(node = node.idx.0; "worker has no samples, skipping training");
            return Ok(Outcome {
                update: ChildUpdate {
                    idx: node.idx,
                    state_dict: model.state_dict(),
                    num_samples,
                },
                history: Table::new(),
            });
        }

        let batch_size = self.config.batch_size()?;
        let mut loader = if self.config.shuffle {
            DataLoader::shuffled(data.clone(), batch_size, self.loader_rng(node.idx))
        } else {
            DataLoader::new(data.clone(), batch_size)
        };

        let state = WorkerState::new(node.idx, parent.map(|p| p.idx), self.round);
        let trainer = Trainer::new(self.strategy);
        let epochs = self.config.num_local_epochs;

        let history = match self.config.optimizer {
            OptimizerConfig::GradientDescent { learning_rate } => {
                let mut optimizer = GradientDescent::new(learning_rate);
                trainer.fit(&mut model, &mut optimizer, &mut loader, epochs, &state, None)?
            }
            OptimizerConfig::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => {
                let len = model.parameters_mut().0.len();
                let mut optimizer = GradientDescentWithMomentum::new(len, learning_rate, momentum);
                trainer.fit(&mut model, &mut optimizer, &mut loader, epochs, &state, None)?
            }
        };

        let mut history = history
            .with_constant("node/idx", node.idx.0)
            .with_constant("node/kind", node.kind.as_str());
        if let Some(parent) = parent {
            history = history
                .with_constant("parent/idx", parent.idx.0)
                .with_constant("parent/kind", parent.kind.as_str());
        }

        Ok(Outcome {
            update: ChildUpdate {
                idx: node.idx,
                state_dict: model.state_dict(),
                num_samples,
            },
            history,
        })
    }

    /// A generator unique to this worker and round, reproducible when the run is seeded.
    fn loader_rng(&self, node: NodeId) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                let stream = ((self.round as u64) << 32) ^ node.0 as u64;
                StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15))
            }
            None => StdRng::from_os_rng(),
        }
    }
}
