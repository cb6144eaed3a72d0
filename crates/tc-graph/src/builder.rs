//! Name-keyed node construction for front ends.
//!
//! Importers know operators by name and carry their attributes as loosely
//! typed values; [`create_node`] turns that into an [`OpKind`] and runs the
//! normal validation.

use std::collections::BTreeMap;
use std::fmt;

use tc_tensor::{DType, Shape, TensorType};

use crate::error::{Result, ValidationError};
use crate::node::{Node, NodeRef};
use crate::op::{BinaryOp, OpKind, UnaryOp};
use crate::ops;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f64),
    Floats(Vec<f64>),
    Str(String),
    Type(DType),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Ints(v) => write!(f, "{:?}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Floats(v) => write!(f, "{:?}", v),
            AttrValue::Str(v) => write!(f, "{:?}", v),
            AttrValue::Type(v) => write!(f, "{}", v),
        }
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// Build a node from an operator name, its inputs and attributes.
///
/// Recognized attributes:
/// - `Parameter`: `dtype` (type or string), `shape` (ints), optional `name`
/// - `Constant`: `dtype`, `shape`, `value` (float) or `values` (floats)
/// - `Reshape`: `output_shape`, optional `axis_order` (defaults to identity)
/// - `Squeeze`: optional `axes`
/// - `GetOutputElement`: `index`
///
/// `Lstm` takes no attributes and picks its variant from the input count.
pub fn create_node(op_name: &str, inputs: Vec<NodeRef>, attrs: &Attributes) -> Result<NodeRef> {
    let op = match op_name {
        "Parameter" => {
            expect_no_inputs("Parameter", &inputs)?;
            let dtype = dtype_attr("Parameter", attrs)?;
            let shape = shape_attr("Parameter", attrs, "shape")?;
            return match attrs.get("name") {
                Some(AttrValue::Str(name)) => Ok(ops::named_parameter(name, dtype, shape)),
                Some(other) => Err(invalid(
                    "Parameter",
                    format!("'name' must be a string, got {}", other),
                )),
                None => Ok(ops::parameter(dtype, shape)),
            };
        }
        "Constant" => {
            let ty = TensorType::new(
                dtype_attr("Constant", attrs)?,
                shape_attr("Constant", attrs, "shape")?,
            );
            let values = match (attrs.get("value"), attrs.get("values")) {
                (Some(AttrValue::Float(v)), None) => vec![*v],
                (Some(AttrValue::Int(v)), None) => vec![*v as f64],
                (None, Some(AttrValue::Floats(vs))) => vs.clone(),
                (None, Some(AttrValue::Ints(vs))) => vs.iter().map(|&v| v as f64).collect(),
                _ => {
                    return Err(invalid(
                        "Constant",
                        "exactly one of 'value' or 'values' is required".to_string(),
                    ))
                }
            };
            OpKind::Constant { ty, values }
        }
        "Negative" => OpKind::Unary(UnaryOp::Negative),
        "Exp" => OpKind::Unary(UnaryOp::Exp),
        "Tanh" => OpKind::Unary(UnaryOp::Tanh),
        "Sigmoid" => OpKind::Unary(UnaryOp::Sigmoid),
        "Relu" => OpKind::Unary(UnaryOp::Relu),
        "Add" => OpKind::Binary(BinaryOp::Add),
        "Subtract" => OpKind::Binary(BinaryOp::Subtract),
        "Multiply" => OpKind::Binary(BinaryOp::Multiply),
        "Divide" => OpKind::Binary(BinaryOp::Divide),
        "Maximum" => OpKind::Binary(BinaryOp::Maximum),
        "Dot" => OpKind::Dot,
        "Reshape" => {
            let output_shape = shape_attr("Reshape", attrs, "output_shape")?;
            let axis_order = match attrs.get("axis_order") {
                Some(_) => usizes_attr("Reshape", attrs, "axis_order")?,
                None => {
                    let rank = inputs.first().and_then(|n| n.ty()).map_or(0, TensorType::rank);
                    (0..rank).collect()
                }
            };
            OpKind::Reshape {
                axis_order,
                output_shape: Shape::new(output_shape),
            }
        }
        "Squeeze" => {
            let axes = match attrs.get("axes") {
                Some(_) => usizes_attr("Squeeze", attrs, "axes")?,
                None => Vec::new(),
            };
            return match inputs.as_slice() {
                [data] => ops::squeeze(data, &axes),
                _ => Err(ValidationError::ArityMismatch {
                    op: "Reshape",
                    expected: 1,
                    got: inputs.len(),
                }),
            };
        }
        "GetOutputElement" => {
            let index = match attrs.get("index") {
                Some(AttrValue::Int(i)) if *i >= 0 => *i as usize,
                _ => {
                    return Err(invalid(
                        "GetOutputElement",
                        "'index' must be a non-negative int".to_string(),
                    ))
                }
            };
            OpKind::GetOutputElement { index }
        }
        "Lstm" => OpKind::Lstm {
            fused: inputs.len() == 5,
        },
        other => return Err(ValidationError::UnknownOp(other.to_string())),
    };
    Node::new(op, inputs)
}

fn expect_no_inputs(op: &'static str, inputs: &[NodeRef]) -> Result<()> {
    if inputs.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::ArityMismatch {
            op,
            expected: 0,
            got: inputs.len(),
        })
    }
}

fn dtype_attr(op: &'static str, attrs: &Attributes) -> Result<DType> {
    match attrs.get("dtype") {
        Some(AttrValue::Type(dtype)) => Ok(*dtype),
        Some(AttrValue::Str(name)) => name
            .parse()
            .map_err(|_| invalid(op, format!("unknown element type '{}'", name))),
        Some(other) => Err(invalid(op, format!("'dtype' must be a type, got {}", other))),
        None => Err(invalid(op, "missing 'dtype'".to_string())),
    }
}

fn shape_attr(op: &'static str, attrs: &Attributes, key: &str) -> Result<Vec<usize>> {
    match attrs.get(key) {
        None => Err(invalid(op, format!("missing '{}'", key))),
        Some(_) => usizes_attr(op, attrs, key),
    }
}

fn usizes_attr(op: &'static str, attrs: &Attributes, key: &str) -> Result<Vec<usize>> {
    match attrs.get(key) {
        Some(AttrValue::Ints(values)) => values
            .iter()
            .map(|&v| {
                usize::try_from(v)
                    .map_err(|_| invalid(op, format!("'{}' has negative entry {}", key, v)))
            })
            .collect(),
        Some(other) => Err(invalid(op, format!("'{}' must be a list of ints, got {}", key, other))),
        None => Ok(Vec::new()),
    }
}

fn invalid(op: &'static str, message: String) -> ValidationError {
    ValidationError::InvalidAttribute { op, message }
}
