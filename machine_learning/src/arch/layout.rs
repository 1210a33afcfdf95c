use std::ops::Range;

use ndarray::{ArrayD, IxDyn};

use crate::{MlErr, Result, state::StateDict};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    range: Range<usize>,
    shape: Vec<usize>,
}

/// Maps a flat parameter buffer into named tensors.
///
/// Tensors are laid out back to back in insertion order, each one in row major
/// order, so the buffer length is the sum of every tensor's element count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterLayout {
    entries: Vec<Entry>,
    size: usize,
}

impl ParameterLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tensor to the layout.
    ///
    /// # Returns
    /// The range the tensor occupies in the flat buffer.
    pub fn push(&mut self, name: impl Into<String>, shape: &[usize]) -> Range<usize> {
        let len: usize = shape.iter().product();
        let range = self.size..self.size + len;

        self.entries.push(Entry {
            name: name.into(),
            range: range.clone(),
            shape: shape.to_vec(),
        });
        self.size += len;

        range
    }

    /// Returns the length of the flat buffer this layout describes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn check_len(&self, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what: "parameter buffer",
                got,
                expected: self.size,
            });
        }

        Ok(())
    }

    /// Copies `params` into a state dict with one tensor per layout entry.
    ///
    /// # Errors
    /// `SizeMismatch` if `params` isn't laid out by `self`.
    pub fn to_state_dict(&self, params: &[f32]) -> Result<StateDict> {
        self.check_len(params.len())?;

        let state_dict = self
            .entries
            .iter()
            .map(|e| {
                let data = params[e.range.clone()].to_vec();
                // SAFETY: The range holds exactly as many elements as the shape.
                let tensor = ArrayD::from_shape_vec(IxDyn(&e.shape), data).unwrap();
                (e.name.clone(), tensor)
            })
            .collect();

        Ok(state_dict)
    }

    /// Writes the tensors of `state_dict` into `params`.
    ///
    /// Nothing is written unless every tensor is present with the right shape.
    ///
    /// # Errors
    /// `ShapeMismatch` if `state_dict` lacks a tensor of the layout, carries one the layout
    /// doesn't know or disagrees on a shape, and `SizeMismatch` if `params` isn't laid out
    /// by `self`.
    pub fn load(&self, state_dict: &StateDict, params: &mut [f32]) -> Result<()> {
        self.check_len(params.len())?;

        let mut tensors = Vec::with_capacity(self.entries.len());
        for e in &self.entries {
            let tensor = state_dict.get(&e.name);
            match tensor {
                Some(t) if t.shape() == e.shape.as_slice() => tensors.push((e, t)),
                _ => {
                    return Err(MlErr::ShapeMismatch {
                        key: e.name.clone(),
                        got: tensor.map(|t| t.shape().to_vec()),
                        expected: Some(e.shape.clone()),
                    });
                }
            }
        }

        if let Some((key, tensor)) = state_dict.iter().find(|(k, _)| self.entry(k).is_none()) {
            return Err(MlErr::ShapeMismatch {
                key: key.clone(),
                got: Some(tensor.shape().to_vec()),
                expected: None,
            });
        }

        for (e, tensor) in tensors {
            params[e.range.clone()]
                .iter_mut()
                .zip(tensor.iter())
                .for_each(|(p, &t)| *p = t);
        }

        Ok(())
    }
}
