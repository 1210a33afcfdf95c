pub mod dataloader;
pub mod dataset;
pub mod partition;

pub use dataloader::{Batch, Batches, DataLoader};
pub use dataset::{DataError, Dataset, InMemoryDataset, Sample, Subset};
pub use partition::{FederatedDataset, SplitConfig, federated_split, label_histogram};
