//! `tc-jit` - Native execution of compiled tensor graphs.
//!
//! This crate provides:
//! - `Toolchain`, the host C compiler context (configured by `ToolchainConfig`)
//! - `ExecutionEngine`, which binds one CPU compilation unit, loads it and
//!   resolves its entry points
//! - `compile`, the whole graph-to-`CompiledFunction` pipeline

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod toolchain;

pub use config::ToolchainConfig;
pub use engine::{EntryPoint, ExecutionEngine};
pub use error::{EngineError, InvokeError, JitError, Result, ToolchainError};
pub use pipeline::{compile, CompiledFunction};
pub use toolchain::Toolchain;
