use std::fmt;

use crate::error::{Result, TensorError};

/// A tensor shape: the ordered extents of every dimension.
///
/// The empty shape is a scalar holding exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// The rank-0 shape.
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Total number of elements (product of all dimension sizes, 1 for scalars).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Row-major contiguous strides counted in elements.
    ///
    /// For a shape [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }
        let mut strides = vec![0usize; self.dims.len()];
        strides[self.dims.len() - 1] = 1;
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Row-major contiguous strides counted in bytes for elements of
    /// `element_size` bytes.
    pub fn byte_strides(&self, element_size: usize) -> Vec<usize> {
        self.strides()
            .into_iter()
            .map(|stride| stride * element_size)
            .collect()
    }

    /// Returns the shape with its axes reordered by `axis_order`.
    pub fn permuted(&self, axis_order: &[usize]) -> Result<Shape> {
        if axis_order.len() != self.dims.len() {
            return Err(TensorError::ShapeMismatch {
                expected: self.dims.clone(),
                got: axis_order.to_vec(),
            });
        }
        let mut seen = vec![false; self.dims.len()];
        let mut dims = Vec::with_capacity(self.dims.len());
        for &axis in axis_order {
            if axis >= self.dims.len() || seen[axis] {
                return Err(TensorError::InvalidAxis {
                    axis,
                    ndim: self.dims.len(),
                });
            }
            seen[axis] = true;
            dims.push(self.dims[axis]);
        }
        Ok(Shape::new(dims))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}
