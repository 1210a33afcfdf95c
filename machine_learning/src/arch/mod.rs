mod layout;
mod module;
mod softmax_regression;

pub use layout::ParameterLayout;
pub use module::{Loss, Mode, Module};
pub use softmax_regression::SoftmaxRegression;
