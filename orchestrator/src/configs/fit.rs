use std::{fs, num::NonZeroUsize, path::Path};

use serde::{Deserialize, Serialize};
use strategies::StrategySpec;

use super::OptimizerConfig;
use crate::{OrchestratorError, Result};

/// Configuration of a synchronous federated fit.
///
/// Every field has a default, so a JSON file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// The amount of aggregation rounds.
    pub num_global_rounds: usize,
    /// The amount of epochs each worker trains for on every round.
    pub num_local_epochs: usize,
    pub batch_size: usize,
    pub optimizer: OptimizerConfig,
    /// Whether workers reshuffle their data on every epoch.
    pub shuffle: bool,
    /// Seeds the shuffling of every worker, drawn from the OS if missing.
    pub seed: Option<u64>,
    /// Size of the thread pool running the subtrees, one per core if missing.
    pub num_threads: Option<usize>,
    pub strategy: StrategySpec,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            num_global_rounds: 1,
            num_local_epochs: 2,
            batch_size: 32,
            optimizer: OptimizerConfig::default(),
            shuffle: true,
            seed: None,
            num_threads: None,
            strategy: StrategySpec::default(),
        }
    }
}

impl FitConfig {
    /// Parses and validates a configuration.
    ///
    /// # Errors
    /// Returns `Json` if `s` is malformed and `InvalidConfig` if a field is out of range.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    /// Returns `Io` if the file can't be read, otherwise as `from_json_str`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// # Errors
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "batch_size must be positive".into(),
            ));
        }

        if self.num_threads == Some(0) {
            return Err(OrchestratorError::InvalidConfig(
                "num_threads must be positive".into(),
            ));
        }

        let lr = self.optimizer.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "learning_rate must be positive, got {lr}"
            )));
        }

        if let OptimizerConfig::GradientDescentWithMomentum { momentum, .. } = self.optimizer {
            if !(0.0..1.0).contains(&momentum) {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "momentum must be in [0, 1), got {momentum}"
                )));
            }
        }

        Ok(())
    }

    /// The batch size, once validated.
    pub(crate) fn batch_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| OrchestratorError::InvalidConfig("batch_size must be positive".into()))
    }
}
