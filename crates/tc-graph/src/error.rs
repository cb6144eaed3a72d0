use tc_tensor::DType;
use thiserror::Error;

/// A node could not be constructed because one of its operation's
/// preconditions does not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{op}: expected {expected} inputs, got {got}")]
    ArityMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{op}: inputs need the same element type; input {index} is {got}, expected {expected}")]
    ElementTypeMismatch {
        op: &'static str,
        index: usize,
        expected: DType,
        got: DType,
    },
    #[error("{op}: rank mismatch: {message}")]
    RankMismatch { op: &'static str, message: String },
    #[error("{op}: shape mismatch: {message}")]
    ShapeMismatch { op: &'static str, message: String },
    #[error("{op}: element type {dtype} is not supported: {message}")]
    UnsupportedElementType {
        op: &'static str,
        dtype: DType,
        message: String,
    },
    #[error("{op}: input {index} has {outputs} outputs; select one with GetOutputElement")]
    MultiOutputInput {
        op: &'static str,
        index: usize,
        outputs: usize,
    },
    #[error("{op}: invalid attribute: {message}")]
    InvalidAttribute { op: &'static str, message: String },
    #[error("unknown operation '{0}'")]
    UnknownOp(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("graph '{0}' has no results")]
    NoResults(String),
    #[error("node '{0}' is declared as a parameter but is not a Parameter op")]
    NotAParameter(String),
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),
    #[error("parameter '{0}' is used but not declared as a graph parameter")]
    UndeclaredParameter(String),
    #[error("node '{0}' is not part of the graph")]
    NodeNotInGraph(String),
    #[error("input index {index} out of range for node '{node}' with {arity} inputs")]
    InputIndexOutOfRange {
        node: String,
        index: usize,
        arity: usize,
    },
    #[error("connecting '{producer}' into '{consumer}' would introduce a cycle")]
    CycleDetected { producer: String, consumer: String },
}
