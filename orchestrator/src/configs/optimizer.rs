use serde::{Deserialize, Serialize};

/// The optimizer every worker trains with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    GradientDescent { learning_rate: f32 },
    GradientDescentWithMomentum { learning_rate: f32, momentum: f32 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::GradientDescent {
            learning_rate: 1e-3,
        }
    }
}

impl OptimizerConfig {
    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::GradientDescent { learning_rate }
            | Self::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        }
    }
}
