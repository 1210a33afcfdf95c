pub mod arch;
pub mod data;
pub mod error;
pub mod optimization;
pub mod state;
pub mod training;

pub use error::{MlErr, Result};
pub use state::{StateDict, average_state_dicts, weighted_average_state_dicts};
