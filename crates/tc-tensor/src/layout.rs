use crate::dtype::DType;
use crate::shape::Shape;
use crate::types::TensorType;

/// How the elements of a tensor are addressed in memory.
///
/// Strides are counted in bytes, one per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorLayout {
    tensor_type: TensorType,
    strides: Vec<usize>,
}

impl TensorLayout {
    /// Dense row-major layout for `tensor_type`.
    pub fn dense(tensor_type: TensorType) -> Self {
        let strides = tensor_type
            .shape()
            .byte_strides(tensor_type.dtype().size_in_bytes());
        TensorLayout {
            tensor_type,
            strides,
        }
    }

    pub fn tensor_type(&self) -> &TensorType {
        &self.tensor_type
    }

    pub fn shape(&self) -> &Shape {
        self.tensor_type.shape()
    }

    pub fn element_type(&self) -> DType {
        self.tensor_type.dtype()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Size of the backing allocation in bytes.
    pub fn size(&self) -> usize {
        self.tensor_type.byte_len()
    }
}

/// A named tensor value produced by a graph node.
///
/// Descriptors are created once with their node and shared behind an `Arc`;
/// code generation borrows them instead of copying.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorDescriptor {
    name: String,
    layout: TensorLayout,
}

impl TensorDescriptor {
    pub fn new(name: impl Into<String>, tensor_type: TensorType) -> Self {
        TensorDescriptor {
            name: name.into(),
            layout: TensorLayout::dense(tensor_type),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &TensorLayout {
        &self.layout
    }

    pub fn tensor_type(&self) -> &TensorType {
        self.layout.tensor_type()
    }
}
