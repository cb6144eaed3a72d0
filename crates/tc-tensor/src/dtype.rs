use std::fmt;
use std::str::FromStr;

use crate::error::TensorError;

/// Element types a tensor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// One byte per element, zero is false.
    Boolean,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    I8,
    I32,
    I64,
    U8,
}

impl DType {
    pub const ALL: [DType; 8] = [
        DType::Boolean,
        DType::F16,
        DType::F32,
        DType::F64,
        DType::I8,
        DType::I32,
        DType::I64,
        DType::U8,
    ];

    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::Boolean | DType::I8 | DType::U8 => 1,
            DType::F16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    /// Canonical C spelling of the element type, used when emitting
    /// typed memory accesses.
    pub fn c_type_name(&self) -> &'static str {
        match self {
            DType::Boolean => "char",
            DType::F16 => "_Float16",
            DType::F32 => "float",
            DType::F64 => "double",
            DType::I8 => "int8_t",
            DType::I32 => "int32_t",
            DType::I64 => "int64_t",
            DType::U8 => "uint8_t",
        }
    }

    /// Returns true for the floating point formats.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Boolean => "bool",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
        };
        f.write_str(name)
    }
}

impl FromStr for DType {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DType::ALL
            .iter()
            .copied()
            .find(|dtype| dtype.to_string() == normalized)
            .ok_or_else(|| TensorError::UnknownDType(s.to_string()))
    }
}
