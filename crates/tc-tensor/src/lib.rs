//! `tc-tensor` - Value types shared by every stage of tensor-compiler.
//!
//! This crate provides:
//! - `DType` element types with their sizes and C spellings
//! - `Shape` and `TensorType` (element type + shape)
//! - `TensorLayout` / `TensorDescriptor`, the byte-level addressing facts
//!   code generation reads
//! - A host `Tensor` backed by `CpuStorage`, used to call compiled code

pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;
pub mod storage;
pub mod tensor;
pub mod types;

// Re-export primary types at the crate root for convenience.
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use layout::{TensorDescriptor, TensorLayout};
pub use shape::Shape;
pub use storage::CpuStorage;
pub use tensor::Tensor;
pub use types::TensorType;
