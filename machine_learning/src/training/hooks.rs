use flock::WorkerState;

use crate::arch::Loss;

/// Callbacks the `Trainer` invokes around every backward pass.
///
/// Both default to returning the loss untouched.
pub trait TrainHooks: Send + Sync {
    /// Transforms the loss before gradients are computed, so whatever this
    /// returns is what gets differentiated.
    fn before_backprop(&self, _state: &WorkerState, loss: Loss) -> Loss {
        loss
    }

    /// Transforms the loss once its gradients are computed. The result is only
    /// reported, it no longer affects the update.
    fn after_backprop(&self, _state: &WorkerState, loss: Loss) -> Loss {
        loss
    }
}

/// Hooks that leave every loss as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl TrainHooks for NoHooks {}
