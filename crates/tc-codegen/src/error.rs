use tc_graph::GraphError;
use tc_tensor::DType;
use thiserror::Error;

use crate::target::Target;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("{op}: element type {dtype} is not supported on {target}")]
    UnsupportedElementType {
        op: &'static str,
        dtype: DType,
        target: Target,
    },
    #[error("{op} is not supported on {target}")]
    UnsupportedOp { op: &'static str, target: Target },
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
}

pub type Result<T> = std::result::Result<T, CodegenError>;
