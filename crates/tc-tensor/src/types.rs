use std::fmt;

use crate::dtype::DType;
use crate::shape::Shape;

/// Element type plus shape: everything the graph knows about a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    dtype: DType,
    shape: Shape,
}

impl TensorType {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        TensorType {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn scalar(dtype: DType) -> Self {
        TensorType::new(dtype, Shape::scalar())
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Bytes needed for a dense buffer of this type.
    pub fn byte_len(&self) -> usize {
        self.numel() * self.dtype.size_in_bytes()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_len() {
        let ty = TensorType::new(DType::F64, [2, 3]);
        assert_eq!(ty.numel(), 6);
        assert_eq!(ty.byte_len(), 48);
        assert_eq!(ty.to_string(), "f64[2, 3]");
    }

    #[test]
    fn test_scalar() {
        let ty = TensorType::scalar(DType::I32);
        assert_eq!(ty.rank(), 0);
        assert_eq!(ty.byte_len(), 4);
    }
}
