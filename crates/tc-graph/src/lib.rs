//! `tc-graph` - The intermediate representation.
//!
//! This crate provides:
//! - `OpKind`, the closed set of operations, and its shape/type inference
//! - `Node`, validated at construction and shared through `NodeRef`
//! - `Graph` with topological traversal, transformation and liveness
//! - Typed constructors in [`ops`] and name-keyed construction in [`builder`]

pub mod builder;
pub mod error;
pub mod graph;
pub mod liveness;
pub mod lstm;
pub mod node;
pub mod op;
pub mod ops;

pub use builder::{create_node, AttrValue, Attributes};
pub use error::{GraphError, Result, ValidationError};
pub use graph::{validate_list, Graph, TopologicalOrder};
pub use liveness::{buffer_owner, Liveness};
pub use lstm::LstmDims;
pub use node::{Node, NodeId, NodeRef};
pub use op::{BinaryOp, OpKind, UnaryOp};
