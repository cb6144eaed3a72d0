//! `tc-codegen` - Turns a validated graph into a compilation unit.
//!
//! This crate provides:
//! - `generate(graph, target)`, the single entry point
//! - A C emitter for the CPU, whose units the `tc-jit` engine compiles and loads
//! - A GPU emitter producing CUDA kernels and a `LaunchSchedule`
//! - `TensorViewWrapper`, the binding between a tensor descriptor and the
//!   variable generated code uses for it

pub mod backend;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod target;
pub mod unit;
pub mod wrapper;
pub mod writer;

pub use backend::{emitter, entry_name, generate, Emitter};
pub use error::{CodegenError, Result};
pub use gpu::{LaunchSchedule, ScheduleStep};
pub use target::Target;
pub use unit::CompilationUnit;
pub use wrapper::TensorViewWrapper;
