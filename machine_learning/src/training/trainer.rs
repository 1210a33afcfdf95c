use std::time::SystemTime;

use flock::WorkerState;
use log::{debug, trace};

use super::{MetricLog, Record, Table, TrainHooks};
use crate::{
    Result,
    arch::{Mode, Module},
    data::{DataLoader, Dataset},
    optimization::Optimizer,
};

/// Runs the local training loop of a single worker.
///
/// The trainer itself is stateless, every call owns its metric buffer, so a
/// single instance can drive any number of consecutive `fit` calls.
pub struct Trainer<'h, H: ?Sized> {
    hooks: &'h H,
}

impl<'h, H: TrainHooks + ?Sized> Trainer<'h, H> {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `hooks` - The callbacks to invoke around every backward pass.
    pub fn new(hooks: &'h H) -> Self {
        Self { hooks }
    }

    /// Trains `model` for `num_epochs` passes over `train`.
    ///
    /// For every batch, in loader order, runs the training step, the
    /// `before_backprop` hook, the backward pass, the `after_backprop` hook and
    /// the optimizer step. If `valid` is given, a full validation pass follows
    /// every single training batch.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `optimizer` - Updates the model's parameters after each backward pass.
    /// * `train` - The training batches.
    /// * `num_epochs` - The amount of passes over `train`.
    /// * `state` - The executing worker, handed to the hooks.
    /// * `valid` - Optional validation batches.
    ///
    /// # Returns
    /// The `train/*` and `valid/*` records, in emission order.
    ///
    /// # Errors
    /// The first error raised by a step function, the loader or the optimizer.
    pub fn fit<M, O, D>(
        &self,
        model: &mut M,
        optimizer: &mut O,
        train: &mut DataLoader<D>,
        num_epochs: usize,
        state: &WorkerState,
        mut valid: Option<&mut DataLoader<D>>,
    ) -> Result<Table>
    where
        M: Module + ?Sized,
        O: Optimizer,
        D: Dataset,
    {
        model.set_mode(Mode::Train);
        model.set_grad_enabled(true);

        let mut log = MetricLog::new();

        for epoch in 0..num_epochs {
            let mut epoch_loss = 0.0;
            let mut batches = 0;

            for (batch_idx, batch) in train.iter().enumerate() {
                let batch = batch?;

                let loss = model.training_step(&batch, batch_idx)?;
                let loss = self.hooks.before_backprop(state, loss);

                optimizer.zero_grad(model);
                model.backward(&loss)?;
                let loss = self.hooks.after_backprop(state, loss);
                optimizer.step(model)?;

                trace!(
                    worker = state.idx.0,
                    epoch = epoch,
                    batch = batch_idx,
                    loss = loss.value();
                    "train step"
                );

                log.log(
                    Record::new()
                        .with("train/loss", loss.value())
                        .with("train/epoch", epoch)
                        .with("train/batch_idx", batch_idx)
                        .with("train/time", SystemTime::now()),
                );

                epoch_loss += loss.value();
                batches += 1;

                if let Some(valid) = valid.as_deref_mut() {
                    validate_into(model, valid, epoch, &mut log)?;
                }
            }

            if batches > 0 {
                debug!(
                    worker = state.idx.0,
                    epoch = epoch,
                    loss = epoch_loss / batches as f32;
                    "finished epoch"
                );
            }
        }

        Ok(log.into_table())
    }

    /// Runs a full validation pass with gradient tracking disabled.
    ///
    /// # Returns
    /// One `valid/*` record per batch.
    ///
    /// # Errors
    /// The first error raised by the validation step or the loader. The model's
    /// mode and gradient flag are restored either way.
    pub fn validate<M, D>(
        &self,
        model: &mut M,
        valid: &mut DataLoader<D>,
        epoch: usize,
    ) -> Result<Table>
    where
        M: Module + ?Sized,
        D: Dataset,
    {
        let mut log = MetricLog::new();
        validate_into(model, valid, epoch, &mut log)?;
        Ok(log.into_table())
    }

    /// Runs the test step over every batch with gradient tracking disabled.
    ///
    /// # Errors
    /// The first error raised by the test step or the loader.
    pub fn test<M, D>(&self, model: &mut M, test: &mut DataLoader<D>) -> Result<()>
    where
        M: Module + ?Sized,
        D: Dataset,
    {
        no_grad(model, |model| {
            for (batch_idx, batch) in test.iter().enumerate() {
                model.test_step(&batch?, batch_idx)?;
            }

            Ok(())
        })
    }
}

fn validate_into<M, D>(
    model: &mut M,
    valid: &mut DataLoader<D>,
    epoch: usize,
    log: &mut MetricLog,
) -> Result<()>
where
    M: Module + ?Sized,
    D: Dataset,
{
    no_grad(model, |model| {
        for (batch_idx, batch) in valid.iter().enumerate() {
            let loss = model.validation_step(&batch?, batch_idx)?;

            log.log(
                Record::new()
                    .with("valid/loss", loss.value())
                    .with("valid/epoch", epoch)
                    .with("valid/batch_idx", batch_idx)
                    .with("valid/time", SystemTime::now()),
            );
        }

        Ok(())
    })
}

/// Runs `f` in eval mode without gradient tracking, then puts the model back
/// the way it was, even if `f` failed.
fn no_grad<M, T, F>(model: &mut M, f: F) -> Result<T>
where
    M: Module + ?Sized,
    F: FnOnce(&mut M) -> Result<T>,
{
    let mode = model.mode();
    let grad_enabled = model.grad_enabled();

    model.set_mode(Mode::Eval);
    model.set_grad_enabled(false);

    let res = f(model);

    model.set_mode(mode);
    model.set_grad_enabled(grad_enabled);

    res
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::{Arc, Mutex},
    };

    use flock::NodeId;
    use ndarray::Array2;

    use super::*;
    use crate::{
        MlErr,
        arch::Loss,
        data::{Batch, InMemoryDataset},
        optimization::GradientDescent,
        state::StateDict,
        training::NoHooks,
    };

    type Events = Arc<Mutex<Vec<String>>>;

    /// Records every interaction with the trainer.
    struct Probe {
        events: Events,
        mode: Mode,
        grad_enabled: bool,
        fail_validation: bool,
        weights: Vec<f32>,
        grad: Vec<f32>,
    }

    impl Probe {
        fn new(events: &Events) -> Self {
            Self {
                events: Arc::clone(events),
                mode: Mode::Eval,
                grad_enabled: false,
                fail_validation: false,
                weights: vec![0.],
                grad: vec![0.],
            }
        }

        fn push(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }
    }

    impl Module for Probe {
        fn training_step(&mut self, _batch: &Batch, batch_idx: usize) -> Result<Loss> {
            assert!(self.grad_enabled);
            assert_eq!(self.mode, Mode::Train);
            self.push(format!("train_step {batch_idx}"));
            Ok(Loss::new(1.0))
        }

        fn validation_step(&mut self, _batch: &Batch, batch_idx: usize) -> Result<Loss> {
            assert!(!self.grad_enabled);
            assert_eq!(self.mode, Mode::Eval);
            if self.fail_validation {
                return Err(MlErr::step("validation blew up"));
            }
            self.push(format!("valid_step {batch_idx}"));
            Ok(Loss::new(2.0))
        }

        fn test_step(&mut self, _batch: &Batch, batch_idx: usize) -> Result<Loss> {
            assert!(!self.grad_enabled);
            self.push(format!("test_step {batch_idx}"));
            Ok(Loss::new(3.0))
        }

        fn backward(&mut self, loss: &Loss) -> Result<()> {
            self.push(format!("backward {}", loss.value()));
            self.grad[0] += loss.grad_scale();
            Ok(())
        }

        fn mode(&self) -> Mode {
            self.mode
        }

        fn set_mode(&mut self, mode: Mode) {
            self.mode = mode;
        }

        fn grad_enabled(&self) -> bool {
            self.grad_enabled
        }

        fn set_grad_enabled(&mut self, enabled: bool) {
            self.grad_enabled = enabled;
        }

        fn zero_grad(&mut self) {
            self.push("zero_grad");
            self.grad[0] = 0.;
        }

        fn parameters_mut(&mut self) -> (&mut [f32], &[f32]) {
            self.events.lock().unwrap().push("step".into());
            (&mut self.weights, &self.grad)
        }

        fn state_dict(&self) -> StateDict {
            StateDict::new()
        }

        fn load_state_dict(&mut self, _state_dict: &StateDict) -> Result<()> {
            Ok(())
        }
    }

    /// Doubles the loss before backprop and tags it after.
    struct Doubling {
        events: Events,
    }

    impl TrainHooks for Doubling {
        fn before_backprop(&self, state: &WorkerState, loss: Loss) -> Loss {
            self.events
                .lock()
                .unwrap()
                .push(format!("before {}", state.idx));
            loss.scale(2.0)
        }

        fn after_backprop(&self, _state: &WorkerState, loss: Loss) -> Loss {
            self.events.lock().unwrap().push("after".into());
            loss.shift(0.5)
        }
    }

    fn loader(n: usize) -> DataLoader<InMemoryDataset> {
        let ds = InMemoryDataset::new(Array2::zeros((n, 1)), vec![0; n]).unwrap();
        DataLoader::new(ds, NonZeroUsize::new(1).unwrap())
    }

    fn worker() -> WorkerState {
        WorkerState::new(NodeId(3), Some(NodeId(0)), 0)
    }

    #[test]
    fn hooks_wrap_the_backward_pass() {
        let events = Events::default();
        let hooks = Doubling {
            events: Arc::clone(&events),
        };
        let mut model = Probe::new(&events);
        let mut opt = GradientDescent::new(1.0);

        let table = Trainer::new(&hooks)
            .fit(&mut model, &mut opt, &mut loader(1), 1, &worker(), None)
            .unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            [
                "train_step 0",
                "before 3",
                "zero_grad",
                "backward 2",
                "after",
                "step"
            ]
        );
        assert_eq!(model.weights, [-2.]);
        assert_eq!(table.get(0, "train/loss").unwrap().as_f64(), Some(2.5));
    }

    #[test]
    fn validation_follows_every_batch() {
        let events = Events::default();
        let mut model = Probe::new(&events);
        let mut opt = GradientDescent::new(0.1);
        let mut valid = loader(2);

        let table = Trainer::new(&NoHooks)
            .fit(
                &mut model,
                &mut opt,
                &mut loader(2),
                1,
                &worker(),
                Some(&mut valid),
            )
            .unwrap();

        let kinds: Vec<_> = (0..table.len())
            .map(|i| table.get(i, "train/loss").is_some())
            .collect();
        assert_eq!(kinds, [true, false, false, true, false, false]);
        assert_eq!(model.mode(), Mode::Train);
        assert!(model.grad_enabled());
    }

    #[test]
    fn failing_validation_restores_the_model() {
        let events = Events::default();
        let mut model = Probe::new(&events);
        model.fail_validation = true;
        model.mode = Mode::Train;
        model.grad_enabled = true;

        let res = Trainer::new(&NoHooks).validate(&mut model, &mut loader(1), 0);

        assert!(matches!(res, Err(MlErr::Step(_))));
        assert_eq!(model.mode(), Mode::Train);
        assert!(model.grad_enabled());
    }

    #[test]
    fn step_errors_abort_fit() {
        let events = Events::default();
        let mut model = Probe::new(&events);
        model.fail_validation = true;
        let mut opt = GradientDescent::new(0.1);
        let mut valid = loader(1);

        let res = Trainer::new(&NoHooks).fit(
            &mut model,
            &mut opt,
            &mut loader(3),
            2,
            &worker(),
            Some(&mut valid),
        );

        assert!(res.is_err());
        let steps = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("train_step"))
            .count();
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_runs_every_batch_without_gradients() {
        let events = Events::default();
        let mut model = Probe::new(&events);
        model.grad_enabled = true;

        Trainer::new(&NoHooks)
            .test(&mut model, &mut loader(2))
            .unwrap();

        assert_eq!(*events.lock().unwrap(), ["test_step 0", "test_step 1"]);
        assert!(model.grad_enabled());
    }
}
