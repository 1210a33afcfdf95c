use crate::{Result, arch::Module};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of weights using the accumulated gradients.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `weights` - The weights to update.
    ///
    /// # Errors
    /// Returns `SizeMismatch` if `grad` and `weights` differ in length.
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()>;

    /// Resets the gradients accumulated by `model`.
    fn zero_grad<M: Module + ?Sized>(&mut self, model: &mut M) {
        model.zero_grad();
    }

    /// Takes one step over the parameters of `model`.
    ///
    /// # Errors
    /// Returns whatever `update_weights` fails with.
    fn step<M: Module + ?Sized>(&mut self, model: &mut M) -> Result<()> {
        let (weights, grad) = model.parameters_mut();
        self.update_weights(grad, weights)
    }
}
