use std::ffi::c_void;

use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// CPU-side tensor storage, one variant per element type.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    Boolean(Vec<u8>),
    F16(Vec<f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
}

/// Applies `$body` to the vector held by any variant.
macro_rules! with_vec {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            CpuStorage::Boolean($v) => $body,
            CpuStorage::F16($v) => $body,
            CpuStorage::F32($v) => $body,
            CpuStorage::F64($v) => $body,
            CpuStorage::I8($v) => $body,
            CpuStorage::I32($v) => $body,
            CpuStorage::I64($v) => $body,
            CpuStorage::U8($v) => $body,
        }
    };
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        with_vec!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the storage in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype().size_in_bytes()
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::Boolean => CpuStorage::Boolean(vec![0; n]),
            DType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F64 => CpuStorage::F64(vec![0.0; n]),
            DType::I8 => CpuStorage::I8(vec![0; n]),
            DType::I32 => CpuStorage::I32(vec![0; n]),
            DType::I64 => CpuStorage::I64(vec![0; n]),
            DType::U8 => CpuStorage::U8(vec![0; n]),
        }
    }

    pub fn from_f32_vec(data: Vec<f32>) -> Self {
        CpuStorage::F32(data)
    }

    pub fn from_f64_vec(data: Vec<f64>) -> Self {
        CpuStorage::F64(data)
    }

    pub fn from_i32_vec(data: Vec<i32>) -> Self {
        CpuStorage::I32(data)
    }

    /// Returns the data as an f32 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not F32.
    pub fn as_f32_slice(&self) -> Result<&[f32]> {
        match self {
            CpuStorage::F32(v) => Ok(v.as_slice()),
            other => Err(dtype_mismatch(DType::F32, other.dtype())),
        }
    }

    /// Returns the data as a mutable f32 slice.
    pub fn as_f32_slice_mut(&mut self) -> Result<&mut [f32]> {
        match self {
            CpuStorage::F32(v) => Ok(v.as_mut_slice()),
            other => Err(dtype_mismatch(DType::F32, other.dtype())),
        }
    }

    /// Returns the data as an f64 slice.
    pub fn as_f64_slice(&self) -> Result<&[f64]> {
        match self {
            CpuStorage::F64(v) => Ok(v.as_slice()),
            other => Err(dtype_mismatch(DType::F64, other.dtype())),
        }
    }

    /// Returns the data as an i32 slice.
    pub fn as_i32_slice(&self) -> Result<&[i32]> {
        match self {
            CpuStorage::I32(v) => Ok(v.as_slice()),
            other => Err(dtype_mismatch(DType::I32, other.dtype())),
        }
    }

    /// Every element widened to f64, whatever the storage type.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            CpuStorage::Boolean(v) | CpuStorage::U8(v) => v.iter().map(|&x| x as f64).collect(),
            CpuStorage::F16(v) => v.iter().map(|x| x.to_f64()).collect(),
            CpuStorage::F32(v) => v.iter().map(|&x| x as f64).collect(),
            CpuStorage::F64(v) => v.clone(),
            CpuStorage::I8(v) => v.iter().map(|&x| x as f64).collect(),
            CpuStorage::I32(v) => v.iter().map(|&x| x as f64).collect(),
            CpuStorage::I64(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }

    /// Raw pointer to the first element, for binding to compiled code.
    pub fn as_ptr(&self) -> *const c_void {
        with_vec!(self, v => v.as_ptr() as *const c_void)
    }

    /// Mutable raw pointer to the first element, for binding to compiled code.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        with_vec!(self, v => v.as_mut_ptr() as *mut c_void)
    }

    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::Boolean(_) => DType::Boolean,
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::I8(_) => DType::I8,
            CpuStorage::I32(_) => DType::I32,
            CpuStorage::I64(_) => DType::I64,
            CpuStorage::U8(_) => DType::U8,
        }
    }
}

fn dtype_mismatch(expected: DType, got: DType) -> TensorError {
    TensorError::DTypeMismatch {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}
