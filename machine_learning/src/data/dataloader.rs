use std::num::NonZeroUsize;

use ndarray::Array2;
use rand::{rngs::StdRng, seq::SliceRandom};

use super::Dataset;
use crate::{MlErr, Result};

/// A batch of samples: one feature row per label.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Array2<f32>,
    pub y: Vec<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Produces a finite, ordered and restartable sequence of batches over a dataset.
///
/// Every call to `iter` starts a fresh pass. When built with `shuffled`, each
/// pass visits the samples in a new random order drawn from the loader's own rng.
#[derive(Debug)]
pub struct DataLoader<D> {
    dataset: D,
    batch_size: NonZeroUsize,
    rng: Option<StdRng>,
}

impl<D: Dataset> DataLoader<D> {
    /// Creates a loader that yields batches in source order.
    pub fn new(dataset: D, batch_size: NonZeroUsize) -> Self {
        Self {
            dataset,
            batch_size,
            rng: None,
        }
    }

    /// Creates a loader that reshuffles the samples on every pass.
    pub fn shuffled(dataset: D, batch_size: NonZeroUsize, rng: StdRng) -> Self {
        Self {
            dataset,
            batch_size,
            rng: Some(rng),
        }
    }

    #[inline]
    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Returns the amount of batches in a full pass.
    #[inline]
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size.get())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Starts a new pass over the dataset.
    pub fn iter(&mut self) -> Batches<'_, D> {
        let mut order: Vec<_> = (0..self.dataset.len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }

        Batches {
            dataset: &self.dataset,
            order,
            batch_size: self.batch_size.get(),
            cursor: 0,
        }
    }
}

/// A single pass of a `DataLoader`.
pub struct Batches<'a, D> {
    dataset: &'a D,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<D: Dataset> Batches<'_, D> {
    fn collect_batch(&self, indices: &[usize]) -> Result<Batch> {
        let width = self.dataset.num_features();
        let mut flat = Vec::with_capacity(indices.len() * width);
        let mut y = Vec::with_capacity(indices.len());

        for &i in indices {
            let sample = self.dataset.get(i)?;
            if sample.features.len() != width {
                return Err(MlErr::SizeMismatch {
                    what: "sample features",
                    got: sample.features.len(),
                    expected: width,
                });
            }

            flat.extend(sample.features.iter().copied());
            y.push(sample.label);
        }

        let x = Array2::from_shape_vec((indices.len(), width), flat).map_err(|_| {
            MlErr::SizeMismatch {
                what: "batch",
                got: indices.len(),
                expected: y.len(),
            }
        })?;

        Ok(Batch { x, y })
    }
}

impl<D: Dataset> Iterator for Batches<'_, D> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.collect_batch(&self.order[self.cursor..end]);
        self.cursor = end;

        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::SeedableRng;

    use super::*;
    use crate::data::InMemoryDataset;

    fn dataset() -> InMemoryDataset {
        let x = Array2::from_shape_fn((5, 2), |(i, j)| (i * 10 + j) as f32);
        InMemoryDataset::new(x, vec![0, 1, 2, 3, 4]).unwrap()
    }

    #[test]
    fn batches_follow_source_order() {
        let mut dl = DataLoader::new(dataset(), NonZeroUsize::new(2).unwrap());
        assert_eq!(dl.len(), 3);

        let batches: Vec<_> = dl.iter().collect::<Result<_>>().unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].x, array![[0., 1.], [10., 11.]]);
        assert_eq!(batches[0].y, [0, 1]);
        assert_eq!(batches[1].y, [2, 3]);
        assert_eq!(batches[2].y, [4]);
    }

    #[test]
    fn passes_can_be_restarted() {
        let mut dl = DataLoader::new(dataset(), NonZeroUsize::new(4).unwrap());

        let first: Vec<_> = dl.iter().map(|b| b.unwrap().y).collect();
        let second: Vec<_> = dl.iter().map(|b| b.unwrap().y).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn shuffled_passes_cover_every_sample_once() {
        let rng = StdRng::seed_from_u64(7);
        let mut dl = DataLoader::shuffled(dataset(), NonZeroUsize::new(2).unwrap(), rng);

        let mut seen: Vec<_> = dl.iter().flat_map(|b| b.unwrap().y).collect();
        seen.sort();

        assert_eq!(seen, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_dataset_yields_nothing() {
        let ds = InMemoryDataset::new(Array2::zeros((0, 3)), vec![]).unwrap();
        let mut dl = DataLoader::new(ds, NonZeroUsize::new(2).unwrap());

        assert!(dl.is_empty());
        assert_eq!(dl.iter().count(), 0);
    }
}
