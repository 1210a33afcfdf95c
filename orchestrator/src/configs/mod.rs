mod fit;
mod optimizer;

pub use fit::FitConfig;
pub use optimizer::OptimizerConfig;
