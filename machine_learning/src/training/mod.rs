mod hooks;
mod metrics;
mod trainer;

pub use hooks::{NoHooks, TrainHooks};
pub use metrics::{MetricLog, Record, Table, Value};
pub use trainer::Trainer;
