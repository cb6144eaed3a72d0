use tc_codegen::{CodegenError, Target};
use tc_graph::GraphError;
use tc_tensor::TensorType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to run C compiler '{compiler}': {source}")]
    Spawn {
        compiler: String,
        #[source]
        source: std::io::Error,
    },
    #[error("C compiler '{compiler}' failed ({status}):\n{stderr}")]
    CompileFailed {
        compiler: String,
        status: String,
        stderr: String,
    },
    #[error("{0} units cannot be compiled by the host toolchain")]
    UnsupportedTarget(Target),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("compilation unit is empty")]
    EmptyUnit,
    #[error("a compilation unit is already bound to this engine")]
    AlreadyBound,
    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),
    #[error("{0}")]
    Fatal(String),
    #[error("engine is not finalized")]
    NotFinalized,
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("failed to load compiled unit: {0}")]
    Load(String),
}

impl EngineError {
    /// Whether binding a corrected unit to a fresh engine could succeed.
    /// Ordering mistakes never become valid by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Toolchain(_) | EngineError::EmptyUnit | EngineError::Load(_)
        )
    }
}

/// A call was rejected before reaching compiled code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("expected {expected} inputs, got {got}")]
    InputCount { expected: usize, got: usize },
    #[error("expected {expected} outputs, got {got}")]
    OutputCount { expected: usize, got: usize },
    #[error("input {index}: expected {expected}, got {got}")]
    InputType {
        index: usize,
        expected: TensorType,
        got: TensorType,
    },
    #[error("output {index}: expected {expected}, got {got}")]
    OutputType {
        index: usize,
        expected: TensorType,
        got: TensorType,
    },
}

#[derive(Error, Debug)]
pub enum JitError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("invoke error: {0}")]
    Invoke(#[from] InvokeError),
}

pub type Result<T> = std::result::Result<T, JitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let failed = ToolchainError::CompileFailed {
            compiler: "cc".into(),
            status: "exit status: 1".into(),
            stderr: "error: expected ';'".into(),
        };
        assert!(EngineError::from(failed).is_retryable());
        assert!(EngineError::EmptyUnit.is_retryable());
        assert!(!EngineError::AlreadyBound.is_retryable());
        assert!(!EngineError::NotFinalized.is_retryable());
        assert!(!EngineError::Fatal("Error in finalize: x".into()).is_retryable());
        assert!(!EngineError::SymbolNotFound("f".into()).is_retryable());
    }

    #[test]
    fn test_compile_failure_keeps_stderr() {
        let err = ToolchainError::CompileFailed {
            compiler: "cc".into(),
            status: "exit status: 1".into(),
            stderr: "a.c:1:1: error: unknown type name 'flaot'\n1 error generated.".into(),
        };
        let text = EngineError::from(err).to_string();
        assert!(text.contains("unknown type name 'flaot'"));
        assert!(text.contains("1 error generated."));
    }
}
