use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, linalg};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use super::{Loss, Mode, Module, ParameterLayout};
use crate::{MlErr, Result, data::Batch, state::StateDict};

const WEIGHT: &str = "weight";
const BIAS: &str = "bias";

/// What a forward pass leaves behind for the backward pass.
#[derive(Debug, Clone)]
struct Forward {
    x: Array2<f32>,
    /// Gradient of the mean cross entropy with respect to the logits.
    delta: Array2<f32>,
}

/// A linear multi class classifier trained with cross entropy.
///
/// Computes `softmax(x · W + b)` with `W` of shape `(features, classes)` and `b`
/// of shape `(classes)`, both stored in a single flat buffer.
#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    dim: (usize, usize),
    layout: ParameterLayout,
    params: Vec<f32>,
    grad: Vec<f32>,
    mode: Mode,
    grad_enabled: bool,
    forward: Option<Forward>,
}

impl SoftmaxRegression {
    /// Creates a new `SoftmaxRegression` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `num_features` - The width of the inputs.
    /// * `num_classes` - The amount of labels to tell apart.
    pub fn new(num_features: usize, num_classes: usize) -> Self {
        let mut layout = ParameterLayout::new();
        layout.push(WEIGHT, &[num_features, num_classes]);
        layout.push(BIAS, &[num_classes]);
        let size = layout.size();

        Self {
            dim: (num_features, num_classes),
            layout,
            params: vec![0.; size],
            grad: vec![0.; size],
            mode: Mode::Train,
            grad_enabled: true,
            forward: None,
        }
    }

    /// Creates a new `SoftmaxRegression` with Xavier uniform weights and zero biases.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the model has no features or no classes.
    pub fn xavier_uniform<R: Rng + ?Sized>(
        num_features: usize,
        num_classes: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let mut model = Self::new(num_features, num_classes);

        let fan = (num_features + num_classes) as f32;
        let limit = (6.0 / fan).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit).map_err(|_| MlErr::InvalidParameter {
            what: "xavier fan",
            value: fan as f64,
        })?;

        let w_len = num_features * num_classes;
        model.params[..w_len]
            .iter_mut()
            .for_each(|w| *w = dist.sample(rng));

        Ok(model)
    }

    #[inline]
    pub fn num_features(&self) -> usize {
        self.dim.0
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.dim.1
    }

    /// Predicts the most likely class of every row of `x`.
    ///
    /// # Errors
    /// Returns `SizeMismatch` if `x` doesn't have one column per feature.
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Vec<usize>> {
        let logits = self.logits(x)?;

        let preds = logits
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (c, &z)| {
                        if z > best.1 { (c, z) } else { best }
                    })
                    .0
            })
            .collect();

        Ok(preds)
    }

    fn view_params(&self) -> (ArrayView2<'_, f32>, ArrayView1<'_, f32>) {
        let w_len = self.dim.0 * self.dim.1;
        // SAFETY: The buffer is laid out as `W` followed by `b` on construction.
        let w = ArrayView2::from_shape(self.dim, &self.params[..w_len]).unwrap();
        let b = ArrayView1::from_shape(self.dim.1, &self.params[w_len..]).unwrap();
        (w, b)
    }

    fn view_grad(&mut self) -> (ArrayViewMut2<'_, f32>, ArrayViewMut1<'_, f32>) {
        let w_len = self.dim.0 * self.dim.1;
        let (dw_raw, db_raw) = self.grad.split_at_mut(w_len);
        // SAFETY: The buffer is laid out as `dW` followed by `db` on construction.
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).unwrap();
        (dw, db)
    }

    fn logits(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "batch features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params();
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        Ok(z)
    }

    /// Runs the forward pass, computing the mean cross entropy of the batch and,
    /// if gradients are being tracked, keeping what the backward pass needs.
    fn step(&mut self, batch: &Batch) -> Result<Loss> {
        if batch.is_empty() {
            return Err(MlErr::Empty { what: "batch" });
        }

        if let Some(&label) = batch.y.iter().find(|&&y| y >= self.dim.1) {
            return Err(MlErr::InvalidLabel {
                label,
                num_labels: self.dim.1,
            });
        }

        let mut probs = self.logits(batch.x.view())?;
        for mut row in probs.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &z| m.max(z));
            row.mapv_inplace(|z| (z - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|e| e / sum);
        }

        let n = batch.len() as f32;
        let loss = batch
            .y
            .iter()
            .enumerate()
            .map(|(i, &y)| -probs[[i, y]].max(f32::MIN_POSITIVE).ln())
            .sum::<f32>()
            / n;

        self.forward = None;
        if self.grad_enabled {
            let mut delta = probs;
            for (i, &y) in batch.y.iter().enumerate() {
                delta[[i, y]] -= 1.0;
            }
            delta.mapv_inplace(|d| d / n);

            self.forward = Some(Forward {
                x: batch.x.clone(),
                delta,
            });
        }

        Ok(Loss::new(loss))
    }
}

impl Module for SoftmaxRegression {
    fn training_step(&mut self, batch: &Batch, _batch_idx: usize) -> Result<Loss> {
        self.step(batch)
    }

    fn validation_step(&mut self, batch: &Batch, _batch_idx: usize) -> Result<Loss> {
        self.step(batch)
    }

    fn test_step(&mut self, batch: &Batch, _batch_idx: usize) -> Result<Loss> {
        self.step(batch)
    }

    fn backward(&mut self, loss: &Loss) -> Result<()> {
        if !self.grad_enabled {
            return Err(MlErr::GradDisabled);
        }

        let Forward { x, delta } = self.forward.take().ok_or(MlErr::MissingForward)?;
        let k = loss.grad_scale();

        let (mut dw, mut db) = self.view_grad();
        linalg::general_mat_mul(k, &x.t(), &delta, 1.0, &mut dw);
        db.scaled_add(k, &delta.sum_axis(Axis(0)));

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
        if !enabled {
            self.forward = None;
        }
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    fn parameters_mut(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    fn state_dict(&self) -> StateDict {
        // SAFETY: `params` always has the length of the layout.
        self.layout.to_state_dict(&self.params).unwrap()
    }

    fn load_state_dict(&mut self, state_dict: &StateDict) -> Result<()> {
        self.layout.load(state_dict, &mut self.params)
    }
}
