use std::{fmt, io};

use flock::{FlockErr, NodeId};
use machine_learning::MlErr;

/// The result type used across the orchestrator.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before the first round.
    InvalidConfig(String),
    /// A worker of the flock has no dataset to train on.
    MissingDataset { node: NodeId },
    Flock(FlockErr),
    /// A strategy, trainer or model failure, fatal to the run.
    Ml(MlErr),
    ThreadPool(rayon::ThreadPoolBuildError),
    Json(serde_json::Error),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::MissingDataset { node } => write!(f, "worker {node} has no dataset"),
            Self::Flock(e) => write!(f, "flock error: {e}"),
            Self::Ml(e) => write!(f, "training error: {e}"),
            Self::ThreadPool(e) => write!(f, "failed to build the thread pool: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Flock(e) => Some(e),
            Self::Ml(e) => Some(e),
            Self::ThreadPool(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FlockErr> for OrchestratorError {
    fn from(e: FlockErr) -> Self {
        Self::Flock(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for OrchestratorError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
