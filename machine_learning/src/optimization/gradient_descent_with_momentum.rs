use super::Optimizer;
use crate::{MlErr, Result};

/// Heavy ball gradient descent: every update keeps a decaying running sum of
/// the past gradients, `v = μ·v + g`, and steps along it, `w -= lr·v`.
///
/// The velocity lives as long as the optimizer, so a worker building a fresh
/// optimizer every round starts every round from rest.
#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    lr: f32,
    mu: f32,
    velocity: Vec<f32>,
}

impl GradientDescentWithMomentum {
    /// # Arguments
    /// * `num_params` - The length of the flat parameter buffer it will update.
    /// * `lr` - The learning rate.
    /// * `mu` - How much of the previous velocity survives each update.
    pub fn new(num_params: usize, lr: f32, mu: f32) -> Self {
        Self {
            lr,
            mu,
            velocity: vec![0.; num_params],
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.lr
    }

    pub fn momentum(&self) -> f32 {
        self.mu
    }

    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()> {
        let expected = self.velocity.len();
        for (what, got) in [("gradient", grad.len()), ("weights", weights.len())] {
            if got != expected {
                return Err(MlErr::SizeMismatch {
                    what,
                    got,
                    expected,
                });
            }
        }

        for ((w, &g), v) in weights.iter_mut().zip(grad).zip(&mut self.velocity) {
            *v = self.mu * *v + g;
            *w -= self.lr * *v;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_carries_over() {
        let mut opt = GradientDescentWithMomentum::new(1, 1.0, 0.5);
        let mut weights = [0.];

        opt.update_weights(&[1.], &mut weights).unwrap();
        assert_eq!(weights, [-1.]);

        opt.update_weights(&[1.], &mut weights).unwrap();
        assert_eq!(weights, [-2.5]);
        assert_eq!(opt.velocity(), &[1.5]);
    }

    #[test]
    fn rejects_other_lengths() {
        let mut opt = GradientDescentWithMomentum::new(2, 1.0, 0.9);

        let res = opt.update_weights(&[1.; 3], &mut [0.; 3]);
        assert!(matches!(
            res,
            Err(MlErr::SizeMismatch {
                what: "gradient",
                got: 3,
                expected: 2
            })
        ));

        let res = opt.update_weights(&[1.; 2], &mut [0.; 1]);
        assert!(matches!(res, Err(MlErr::SizeMismatch { what: "weights", .. })));
    }
}
