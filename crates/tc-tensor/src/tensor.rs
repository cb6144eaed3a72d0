use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;
use crate::types::TensorType;

/// A dense row-major tensor living in host memory.
///
/// Host tensors are what callers bind to the inputs and outputs of a
/// compiled function.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    tensor_type: TensorType,
}

impl Tensor {
    /// Wrap existing storage, checking its length against `shape`.
    pub fn from_storage(storage: CpuStorage, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if storage.len() != shape.numel() {
            return Err(TensorError::LengthMismatch {
                len: storage.len(),
                numel: shape.numel(),
            });
        }
        Ok(Tensor {
            tensor_type: TensorType::new(storage.dtype(), shape),
            storage,
        })
    }

    /// Create an f32 tensor.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`.
    pub fn new(data: Vec<f32>, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        assert_eq!(
            data.len(),
            shape.numel(),
            "data length {} does not match shape {} (numel={})",
            data.len(),
            shape,
            shape.numel()
        );
        Tensor {
            storage: CpuStorage::from_f32_vec(data),
            tensor_type: TensorType::new(DType::F32, shape),
        }
    }

    /// An f32 scalar.
    pub fn scalar(value: f32) -> Self {
        Tensor::new(vec![value], Shape::scalar())
    }

    /// Zero-filled tensor of the given type.
    pub fn zeros(tensor_type: &TensorType) -> Self {
        Tensor {
            storage: CpuStorage::zeros(tensor_type.dtype(), tensor_type.numel()),
            tensor_type: tensor_type.clone(),
        }
    }

    pub fn tensor_type(&self) -> &TensorType {
        &self.tensor_type
    }

    pub fn shape(&self) -> &Shape {
        self.tensor_type.shape()
    }

    pub fn dtype(&self) -> DType {
        self.tensor_type.dtype()
    }

    /// Returns the underlying data as an f32 slice.
    pub fn data_f32(&self) -> Result<&[f32]> {
        self.storage.as_f32_slice()
    }

    /// Every element widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.storage.to_f64_vec()
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut CpuStorage {
        &mut self.storage
    }
}
