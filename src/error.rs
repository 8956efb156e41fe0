use std::{
    error::Error,
    fmt::{self, Display},
};

use crate::ParamId;

/// The result type used across the optimizers.
pub type Result<T> = std::result::Result<T, OptimErr>;

/// The optimizers' error type.
#[derive(Debug)]
pub enum OptimErr {
    /// The optimizer does not support this operation at all, retrying won't help.
    Unimplemented {
        optimizer: String,
        operation: &'static str,
    },
    InvalidConfig(String),
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    LengthMismatch {
        got: usize,
        expected: usize,
    },
    UnknownParameter(ParamId),
}

impl Display for OptimErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimErr::Unimplemented {
                optimizer,
                operation,
            } => write!(f, "{optimizer} does not implement {operation}"),
            OptimErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            OptimErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what}: got {got:?}, expected {expected:?}"
            ),
            OptimErr::LengthMismatch { got, expected } => write!(
                f,
                "got {got} gradients for {expected} parameters"
            ),
            OptimErr::UnknownParameter(id) => {
                write!(f, "parameter {id} has no slots, attach it first")
            }
        }
    }
}

impl Error for OptimErr {}

impl From<serde_json::Error> for OptimErr {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}

impl From<rand_distr::NormalError> for OptimErr {
    fn from(value: rand_distr::NormalError) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}
