//! Reference-algebra failure kinds.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RefError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("unknown axis: {0}")]
    AxisUnknown(String),

    #[error("duplicate axis: {0}")]
    AxisDuplicate(String),

    #[error("index {index} out of bounds for axis '{axis}' of size {size}")]
    IndexOutOfBounds { axis: String, index: usize, size: usize },

    #[error("axis '{0}' is not a singleton and cannot be projected away")]
    NotSingleton(String),
}

pub type Result<T> = std::result::Result<T, RefError>;
