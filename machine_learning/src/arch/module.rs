use crate::{Result, data::Batch, state::StateDict};

/// Whether a module is being trained or evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// A differentiable scalar loss.
///
/// `value` is the number reported to metrics while `grad_scale` is the factor
/// the backward pass multiplies every gradient by. Scaling a loss changes both,
/// shifting it by a constant only changes its value since a constant has no
/// gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loss {
    value: f32,
    grad_scale: f32,
}

impl Loss {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            grad_scale: 1.0,
        }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn grad_scale(&self) -> f32 {
        self.grad_scale
    }

    /// Multiplies the loss by `k`.
    pub fn scale(self, k: f32) -> Self {
        Self {
            value: self.value * k,
            grad_scale: self.grad_scale * k,
        }
    }

    /// Adds the constant `c` to the loss.
    pub fn shift(self, c: f32) -> Self {
        Self {
            value: self.value + c,
            ..self
        }
    }
}

/// A trainable model, as seen by the `Trainer` and the optimizers.
///
/// Parameters and their gradients live in two flat buffers of the same length.
/// A step function runs the forward pass for a batch and, while gradient
/// tracking is enabled, records whatever `backward` needs to compute the
/// gradients of the returned loss.
pub trait Module: Send {
    /// Runs the forward pass of a training batch.
    ///
    /// # Errors
    /// Any failure of the model, which must abort the training call.
    fn training_step(&mut self, batch: &Batch, batch_idx: usize) -> Result<Loss>;

    fn validation_step(&mut self, batch: &Batch, batch_idx: usize) -> Result<Loss>;

    fn test_step(&mut self, batch: &Batch, batch_idx: usize) -> Result<Loss>;

    /// Accumulates into the gradient buffer the gradients of `loss`, which must
    /// come from the last step function called.
    ///
    /// # Errors
    /// `GradDisabled` if gradient tracking is off and `MissingForward` if there
    /// is no recorded forward pass to differentiate.
    fn backward(&mut self, loss: &Loss) -> Result<()>;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    fn grad_enabled(&self) -> bool;

    fn set_grad_enabled(&mut self, enabled: bool);

    /// Resets every accumulated gradient to zero.
    fn zero_grad(&mut self);

    /// Returns the parameters, mutably, alongside their gradients.
    fn parameters_mut(&mut self) -> (&mut [f32], &[f32]);

    /// Takes a snapshot of the parameters as named tensors.
    fn state_dict(&self) -> StateDict;

    /// Overwrites the parameters with the tensors of `state_dict`.
    ///
    /// # Errors
    /// A key or shape error if `state_dict` doesn't match this module's own.
    fn load_state_dict(&mut self, state_dict: &StateDict) -> Result<()>;
}
