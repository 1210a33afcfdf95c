use std::{fmt, sync::Arc};

use ndarray::{Array1, Array2};

use crate::{MlErr, Result};

/// Errors produced while accessing dataset samples.
#[derive(Debug)]
pub enum DataError {
    /// The requested sample index is out of bounds.
    OutOfBounds { index: usize, len: usize },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::OutOfBounds { index, len } => {
                write!(f, "sample index {index} is out of bounds for length {len}")
            }
        }
    }
}

impl std::error::Error for DataError {}

/// A single labeled sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: Array1<f32>,
    pub label: usize,
}

/// An ordered, finite and index addressable collection of labeled samples.
///
/// A `Dataset` is responsible only for *providing access* to samples, batching
/// and shuffling belong to the `DataLoader`.
pub trait Dataset: Send + Sync {
    /// Returns the total number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the width of every feature vector.
    fn num_features(&self) -> usize;

    /// Fetches a sample by index.
    ///
    /// # Errors
    /// Returns `DataError::OutOfBounds` if `index` is invalid.
    fn get(&self, index: usize) -> std::result::Result<Sample, DataError>;

    /// Fetches only the label of a sample.
    ///
    /// Implementations backed by a label column should override this to avoid
    /// copying features.
    fn label(&self, index: usize) -> std::result::Result<usize, DataError> {
        Ok(self.get(index)?.label)
    }
}

impl<D: Dataset + ?Sized> Dataset for Arc<D> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn num_features(&self) -> usize {
        (**self).num_features()
    }

    fn get(&self, index: usize) -> std::result::Result<Sample, DataError> {
        (**self).get(index)
    }

    fn label(&self, index: usize) -> std::result::Result<usize, DataError> {
        (**self).label(index)
    }
}

/// A dataset fully held in memory, one row of `features` per label.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    features: Array2<f32>,
    labels: Vec<usize>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Errors
    /// Returns `SizeMismatch` if there isn't exactly one label per feature row.
    pub fn new(features: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: labels.len(),
                expected: features.nrows(),
            });
        }

        Ok(Self { features, labels })
    }

    #[inline]
    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl Dataset for InMemoryDataset {
    #[inline]
    fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    fn num_features(&self) -> usize {
        self.features.ncols()
    }

    fn get(&self, index: usize) -> std::result::Result<Sample, DataError> {
        let label = self.label(index)?;
        let features = self.features.row(index).to_owned();
        Ok(Sample { features, label })
    }

    fn label(&self, index: usize) -> std::result::Result<usize, DataError> {
        self.labels.get(index).copied().ok_or(DataError::OutOfBounds {
            index,
            len: self.labels.len(),
        })
    }
}

/// A view over a subset of another dataset, addressed through an ordered index list.
#[derive(Debug)]
pub struct Subset<D> {
    dataset: Arc<D>,
    indices: Vec<usize>,
}

impl<D> Clone for Subset<D> {
    fn clone(&self) -> Self {
        Self {
            dataset: Arc::clone(&self.dataset),
            indices: self.indices.clone(),
        }
    }
}

impl<D: Dataset> Subset<D> {
    pub fn new(dataset: Arc<D>, indices: Vec<usize>) -> Self {
        Self { dataset, indices }
    }

    /// Indices into the source dataset, in subset order.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[inline]
    pub fn source(&self) -> &Arc<D> {
        &self.dataset
    }

    fn source_index(&self, index: usize) -> std::result::Result<usize, DataError> {
        self.indices
            .get(index)
            .copied()
            .ok_or(DataError::OutOfBounds {
                index,
                len: self.indices.len(),
            })
    }
}

impl<D: Dataset> Dataset for Subset<D> {
    #[inline]
    fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    fn num_features(&self) -> usize {
        self.dataset.num_features()
    }

    fn get(&self, index: usize) -> std::result::Result<Sample, DataError> {
        self.dataset.get(self.source_index(index)?)
    }

    fn label(&self, index: usize) -> std::result::Result<usize, DataError> {
        self.dataset.label(self.source_index(index)?)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn dataset() -> InMemoryDataset {
        InMemoryDataset::new(array![[0., 1.], [2., 3.], [4., 5.]], vec![2, 0, 1]).unwrap()
    }

    #[test]
    fn dataset_basic() {
        let ds = dataset();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.num_features(), 2);
        assert_eq!(
            ds.get(1).unwrap(),
            Sample {
                features: array![2., 3.],
                label: 0
            }
        );
        assert!(matches!(
            ds.get(3),
            Err(DataError::OutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn mismatched_labels_fail() {
        let res = InMemoryDataset::new(array![[0.], [1.]], vec![0]);
        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));
    }

    #[test]
    fn subset_maps_indices() {
        let subset = Subset::new(Arc::new(dataset()), vec![2, 0]);

        assert_eq!(subset.len(), 2);
        assert_eq!(subset.label(0).unwrap(), 1);
        assert_eq!(subset.get(1).unwrap().features, array![0., 1.]);
        assert!(subset.get(2).is_err());
    }
}
