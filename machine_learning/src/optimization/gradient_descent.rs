use super::Optimizer;
use crate::{MlErr, Result};

/// Plain gradient descent, `w -= lr·g`, with no state across updates.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// # Arguments
    /// * `learning_rate` - Scales every step taken by `update_weights`.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    #[inline]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()> {
        if grad.len() != weights.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: weights.len(),
            });
        }

        let lr = self.learning_rate;
        for (w, g) in weights.iter_mut().zip(grad) {
            *w -= lr * g;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut gd = GradientDescent::new(0.5);
        let mut weights = [1., 2., 3.];

        gd.update_weights(&[2., 0., -2.], &mut weights).unwrap();
        assert_eq!(weights, [0., 2., 4.]);
    }

    #[test]
    fn size_mismatch() {
        let mut gd = GradientDescent::new(0.1);
        let res = gd.update_weights(&[1.], &mut [0., 0.]);
        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));
    }
}
