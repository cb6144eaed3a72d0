use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },
    #[error("data length {len} does not match element count {numel}")]
    LengthMismatch { len: usize, numel: usize },
    #[error("unknown element type '{0}'")]
    UnknownDType(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
