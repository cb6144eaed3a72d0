use std::fmt;

use tc_tensor::{Shape, TensorType};

use crate::error::{Result, ValidationError};
use crate::lstm::LstmDims;
use crate::node::NodeRef;

/// Element-wise operations with one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negative,
    Exp,
    Tanh,
    Sigmoid,
    Relu,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Negative => "Negative",
            UnaryOp::Exp => "Exp",
            UnaryOp::Tanh => "Tanh",
            UnaryOp::Sigmoid => "Sigmoid",
            UnaryOp::Relu => "Relu",
        }
    }

    /// Transcendental ops are only defined on floating point inputs.
    pub fn requires_float(&self) -> bool {
        matches!(self, UnaryOp::Exp | UnaryOp::Tanh | UnaryOp::Sigmoid)
    }
}

/// Element-wise operations with two operands of identical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Subtract => "Subtract",
            BinaryOp::Multiply => "Multiply",
            BinaryOp::Divide => "Divide",
            BinaryOp::Maximum => "Maximum",
        }
    }
}

/// Every operation the IR knows about.
///
/// The set is closed: shape/type inference and code generation match on it
/// exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// A graph input.
    Parameter { ty: TensorType },
    /// A literal. `values` holds one value per element, or a single value
    /// splatted over the whole shape.
    Constant { ty: TensorType, values: Vec<f64> },
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Contracts the last axis of the first operand with the first axis of
    /// the second; scales when either operand is a scalar.
    Dot,
    /// Reorders axes by `axis_order`, then reinterprets the elements with
    /// `output_shape`.
    Reshape {
        axis_order: Vec<usize>,
        output_shape: Shape,
    },
    /// Selects one output of a multi-output producer.
    GetOutputElement { index: usize },
    /// One LSTM cell step; `fused` selects the five-input form.
    Lstm { fused: bool },
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Parameter { .. } => "Parameter",
            OpKind::Constant { .. } => "Constant",
            OpKind::Unary(op) => op.name(),
            OpKind::Binary(op) => op.name(),
            OpKind::Dot => "Dot",
            OpKind::Reshape { .. } => "Reshape",
            OpKind::GetOutputElement { .. } => "GetOutputElement",
            OpKind::Lstm { .. } => "Lstm",
        }
    }

    /// Number of inputs this operation takes. Depends on the construction
    /// variant for composite ops.
    pub fn arity(&self) -> usize {
        match self {
            OpKind::Parameter { .. } | OpKind::Constant { .. } => 0,
            OpKind::Unary(_) | OpKind::Reshape { .. } | OpKind::GetOutputElement { .. } => 1,
            OpKind::Binary(_) | OpKind::Dot => 2,
            OpKind::Lstm { fused: false } => 7,
            OpKind::Lstm { fused: true } => 5,
        }
    }

    /// Validate `inputs` against this operation and derive its output types.
    pub(crate) fn infer(&self, inputs: &[NodeRef]) -> Result<Vec<TensorType>> {
        let op = self.name();
        if inputs.len() != self.arity() {
            return Err(ValidationError::ArityMismatch {
                op,
                expected: self.arity(),
                got: inputs.len(),
            });
        }

        let types = if matches!(self, OpKind::GetOutputElement { .. }) {
            Vec::new()
        } else {
            single_output_types(op, inputs)?
        };
        match self {
            OpKind::Parameter { ty } => Ok(vec![ty.clone()]),
            OpKind::Constant { ty, values } => {
                if values.len() != ty.numel() && values.len() != 1 {
                    return Err(ValidationError::InvalidAttribute {
                        op,
                        message: format!(
                            "{} values given for a constant of type {}",
                            values.len(),
                            ty
                        ),
                    });
                }
                Ok(vec![ty.clone()])
            }
            OpKind::Unary(unary) => {
                let ty = types[0];
                if unary.requires_float() && !ty.dtype().is_float() {
                    return Err(ValidationError::UnsupportedElementType {
                        op,
                        dtype: ty.dtype(),
                        message: "a floating point input is required".to_string(),
                    });
                }
                Ok(vec![ty.clone()])
            }
            OpKind::Binary(_) => {
                check_same_element_type(op, &types)?;
                if types[0].shape() != types[1].shape() {
                    return Err(ValidationError::ShapeMismatch {
                        op,
                        message: format!(
                            "arguments must have the same shape, got {} and {}",
                            types[0].shape(),
                            types[1].shape()
                        ),
                    });
                }
                Ok(vec![types[0].clone()])
            }
            OpKind::Dot => infer_dot(&types),
            OpKind::Reshape {
                axis_order,
                output_shape,
            } => {
                let input = types[0];
                input.shape().permuted(axis_order).map_err(|_| {
                    ValidationError::InvalidAttribute {
                        op,
                        message: format!(
                            "axis order {:?} is not a permutation of the {} input axes",
                            axis_order,
                            input.rank()
                        ),
                    }
                })?;
                if input.numel() != output_shape.numel() {
                    return Err(ValidationError::ShapeMismatch {
                        op,
                        message: format!(
                            "cannot reshape {} into {}",
                            input.shape(),
                            output_shape
                        ),
                    });
                }
                Ok(vec![TensorType::new(input.dtype(), output_shape.clone())])
            }
            OpKind::Lstm { fused } => {
                let dims = LstmDims::infer(*fused, &types)?;
                Ok(dims.output_types(types[0].dtype()).to_vec())
            }
            OpKind::GetOutputElement { index } => {
                let producer = &inputs[0];
                match producer.output_type(*index) {
                    Some(ty) => Ok(vec![ty.clone()]),
                    None => Err(ValidationError::InvalidAttribute {
                        op,
                        message: format!(
                            "output index {} out of range for '{}' with {} outputs",
                            index,
                            producer.name(),
                            producer.outputs().len()
                        ),
                    }),
                }
            }
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Parameter { ty } => write!(f, "Parameter<{}>", ty),
            OpKind::Constant { ty, .. } => write!(f, "Constant<{}>", ty),
            OpKind::Reshape {
                axis_order,
                output_shape,
            } => write!(f, "Reshape<{:?} -> {}>", axis_order, output_shape),
            OpKind::GetOutputElement { index } => write!(f, "GetOutputElement<{}>", index),
            OpKind::Lstm { fused: true } => write!(f, "Lstm<fused>"),
            other => f.write_str(other.name()),
        }
    }
}

/// The output type of every input, rejecting multi-output producers.
fn single_output_types<'a>(op: &'static str, inputs: &'a [NodeRef]) -> Result<Vec<&'a TensorType>> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| match input.outputs() {
            [only] => Ok(only.tensor_type()),
            outputs => Err(ValidationError::MultiOutputInput {
                op,
                index,
                outputs: outputs.len(),
            }),
        })
        .collect()
}

pub(crate) fn check_same_element_type<T: std::borrow::Borrow<TensorType>>(
    op: &'static str,
    types: &[T],
) -> Result<()> {
    let Some(first) = types.first() else {
        return Ok(());
    };
    let expected = first.borrow().dtype();
    for (index, ty) in types.iter().enumerate().skip(1) {
        let got = ty.borrow().dtype();
        if got != expected {
            return Err(ValidationError::ElementTypeMismatch {
                op,
                index,
                expected,
                got,
            });
        }
    }
    Ok(())
}

fn infer_dot(types: &[&TensorType]) -> Result<Vec<TensorType>> {
    check_same_element_type("Dot", types)?;
    let (a, b) = (types[0], types[1]);
    if a.shape().is_scalar() {
        return Ok(vec![b.clone()]);
    }
    if b.shape().is_scalar() {
        return Ok(vec![a.clone()]);
    }

    let a_dims = a.shape().dims();
    let b_dims = b.shape().dims();
    let k_a = a_dims[a_dims.len() - 1];
    let k_b = b_dims[0];
    if k_a != k_b {
        return Err(ValidationError::ShapeMismatch {
            op: "Dot",
            message: format!(
                "reduction axes don't match: {} and {}",
                a.shape(),
                b.shape()
            ),
        });
    }
    let dims: Vec<usize> = a_dims[..a_dims.len() - 1]
        .iter()
        .chain(b_dims[1..].iter())
        .copied()
        .collect();
    Ok(vec![TensorType::new(a.dtype(), dims)])
}
