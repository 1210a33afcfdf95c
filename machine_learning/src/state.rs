use std::collections::{BTreeMap, btree_map};

use ndarray::ArrayD;

use crate::{MlErr, Result};

/// Named collection of a model's parameter tensors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict(BTreeMap<String, ArrayD<f32>>);

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.0.insert(key.into(), tensor)
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ArrayD<f32>> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that `other` has exactly the same keys and tensor shapes as `self`.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` naming the first tensor that differs in shape or
    /// that only one of the two carries.
    pub fn check_compatible(&self, other: &StateDict) -> Result<()> {
        for (key, tensor) in &self.0 {
            let theirs = other.0.get(key).map(|t| t.shape());
            if theirs != Some(tensor.shape()) {
                return Err(MlErr::ShapeMismatch {
                    key: key.clone(),
                    got: theirs.map(<[usize]>::to_vec),
                    expected: Some(tensor.shape().to_vec()),
                });
            }
        }

        if let Some((key, tensor)) = other.0.iter().find(|(k, _)| !self.0.contains_key(*k)) {
            return Err(MlErr::ShapeMismatch {
                key: key.clone(),
                got: Some(tensor.shape().to_vec()),
                expected: None,
            });
        }

        Ok(())
    }
}

impl FromIterator<(String, ArrayD<f32>)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for StateDict {
    type Item = (String, ArrayD<f32>);
    type IntoIter = btree_map::IntoIter<String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a StateDict {
    type Item = (&'a String, &'a ArrayD<f32>);
    type IntoIter = btree_map::Iter<'a, String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Averages state dicts elementwise, giving every contributor the same weight.
///
/// Accepts anything that yields state dict references, so both slices and the
/// values of a map work.
///
/// # Errors
/// Returns `Empty` if no state dict is given, or `ShapeMismatch` if any two differ in keys
/// or shapes.
pub fn average_state_dicts<'a, I>(state_dicts: I) -> Result<StateDict>
where
    I: IntoIterator<Item = &'a StateDict>,
{
    let mut iter = state_dicts.into_iter();
    let first = iter.next().ok_or(MlErr::Empty { what: "state dict" })?;

    let mut acc = first.clone();
    let mut n = 1;

    for sd in iter {
        first.check_compatible(sd)?;

        for (key, tensor) in acc.0.iter_mut() {
            *tensor += &sd.0[key];
        }

        n += 1;
    }

    if n > 1 {
        let n = n as f32;
        for tensor in acc.0.values_mut() {
            tensor.mapv_inplace(|x| x / n);
        }
    }

    Ok(acc)
}

/// Averages state dicts elementwise, each one contributing proportionally to its weight.
///
/// # Errors
/// Returns `Empty` if no state dict is given, `InvalidParameter` if a weight is negative or
/// not finite or if all weights add up to zero, or `ShapeMismatch` if any two differ in keys
/// or shapes.
pub fn weighted_average_state_dicts<'a, I>(weighted: I) -> Result<StateDict>
where
    I: IntoIterator<Item = (&'a StateDict, f32)>,
{
    let mut iter = weighted.into_iter();
    let (first, w0) = iter.next().ok_or(MlErr::Empty { what: "state dict" })?;
    check_weight(w0)?;

    let mut acc = first.clone();
    for tensor in acc.0.values_mut() {
        tensor.mapv_inplace(|x| x * w0);
    }

    let mut total = w0;
    for (sd, w) in iter {
        check_weight(w)?;
        first.check_compatible(sd)?;

        for (key, tensor) in acc.0.iter_mut() {
            tensor.scaled_add(w, &sd.0[key]);
        }

        total += w;
    }

    if total <= 0.0 {
        return Err(MlErr::InvalidParameter {
            what: "total aggregation weight",
            value: total as f64,
        });
    }

    for tensor in acc.0.values_mut() {
        tensor.mapv_inplace(|x| x / total);
    }

    Ok(acc)
}

fn check_weight(w: f32) -> Result<()> {
    if !w.is_finite() || w < 0.0 {
        return Err(MlErr::InvalidParameter {
            what: "aggregation weight",
            value: w as f64,
        });
    }

    Ok(())
}
