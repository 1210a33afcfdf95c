use std::{
    error::Error,
    fmt::{self, Display},
};

use crate::data::DataError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    /// A knob is outside of its valid domain (e.g. a non positive alpha).
    InvalidParameter {
        what: &'static str,
        value: f64,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// Two state dicts disagree on a tensor, either on its shape or on whether
    /// it exists at all. A `None` shape marks the side lacking the tensor.
    ShapeMismatch {
        key: String,
        got: Option<Vec<usize>>,
        expected: Option<Vec<usize>>,
    },
    Empty {
        what: &'static str,
    },
    InvalidLabel {
        label: usize,
        num_labels: usize,
    },
    /// A backward pass was requested while gradient tracking is disabled.
    GradDisabled,
    /// A backward pass was requested before any forward pass was recorded.
    MissingForward,
    Data(DataError),
    /// A failure raised by a collaborator inside a step function.
    Step(Box<dyn Error + Send + Sync>),
}

impl MlErr {
    /// Wraps an arbitrary collaborator failure.
    pub fn step<E>(err: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Step(err.into())
    }
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::InvalidParameter { what, value } => {
                write!(f, "invalid value {value} for {what}")
            }
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch { key, got, expected } => match (got, expected) {
                (Some(got), Some(expected)) => write!(
                    f,
                    "tensor {key} has shape {got:?} but {expected:?} was expected"
                ),
                (None, _) => write!(f, "state dict is missing tensor {key}"),
                (Some(_), None) => write!(f, "state dict has unexpected tensor {key}"),
            },
            MlErr::Empty { what } => write!(f, "expected at least one {what}"),
            MlErr::InvalidLabel { label, num_labels } => write!(
                f,
                "label {label} is out of range for {num_labels} labels"
            ),
            MlErr::GradDisabled => write!(f, "backward pass with gradient tracking disabled"),
            MlErr::MissingForward => write!(f, "backward pass without a recorded forward pass"),
            MlErr::Data(e) => write!(f, "data error: {e}"),
            MlErr::Step(e) => write!(f, "step failed: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Data(e) => Some(e),
            MlErr::Step(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<DataError> for MlErr {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}
