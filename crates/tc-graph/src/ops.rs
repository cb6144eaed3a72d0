//! Typed constructors for every operation kind.

use std::sync::Arc;

use tc_tensor::{DType, Shape, TensorType};

use crate::error::{Result, ValidationError};
use crate::node::{Node, NodeRef};
use crate::op::{BinaryOp, OpKind, UnaryOp};

/// A graph input of the given type. Parameters have no preconditions.
pub fn parameter(dtype: DType, shape: impl Into<Shape>) -> NodeRef {
    Node::parameter(None, TensorType::new(dtype, shape))
}

pub fn named_parameter(name: &str, dtype: DType, shape: impl Into<Shape>) -> NodeRef {
    Node::parameter(Some(name.to_string()), TensorType::new(dtype, shape))
}

/// A literal of `shape`; `values` holds every element or a single splat value.
pub fn constant(dtype: DType, shape: impl Into<Shape>, values: Vec<f64>) -> Result<NodeRef> {
    Node::new(
        OpKind::Constant {
            ty: TensorType::new(dtype, shape),
            values,
        },
        Vec::new(),
    )
}

pub fn unary(op: UnaryOp, arg: &NodeRef) -> Result<NodeRef> {
    Node::new(OpKind::Unary(op), vec![Arc::clone(arg)])
}

pub fn binary(op: BinaryOp, lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef> {
    Node::new(OpKind::Binary(op), vec![Arc::clone(lhs), Arc::clone(rhs)])
}

pub fn negative(arg: &NodeRef) -> Result<NodeRef> {
    unary(UnaryOp::Negative, arg)
}

pub fn exp(arg: &NodeRef) -> Result<NodeRef> {
    unary(UnaryOp::Exp, arg)
}

pub fn tanh(arg: &NodeRef) -> Result<NodeRef> {
    unary(UnaryOp::Tanh, arg)
}

pub fn sigmoid(arg: &NodeRef) -> Result<NodeRef> {
    unary(UnaryOp::Sigmoid, arg)
}

pub fn relu(arg: &NodeRef) -> Result<NodeRef> {
    unary(UnaryOp::Relu, arg)
}

pub fn add(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef> {
    binary(BinaryOp::Add, lhs, rhs)
}

pub fn subtract(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef> {
    binary(BinaryOp::Subtract, lhs, rhs)
}

pub fn multiply(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef> {
    binary(BinaryOp::Multiply, lhs, rhs)
}

pub fn divide(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef> {
    binary(BinaryOp::Divide, lhs, rhs)
}

pub fn maximum(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef> {
    binary(BinaryOp::Maximum, lhs, rhs)
}

pub fn dot(lhs: &NodeRef, rhs: &NodeRef) -> Result<NodeRef> {
    Node::new(OpKind::Dot, vec![Arc::clone(lhs), Arc::clone(rhs)])
}

pub fn reshape(
    arg: &NodeRef,
    axis_order: Vec<usize>,
    output_shape: impl Into<Shape>,
) -> Result<NodeRef> {
    Node::new(
        OpKind::Reshape {
            axis_order,
            output_shape: output_shape.into(),
        },
        vec![Arc::clone(arg)],
    )
}

/// Swap the two axes of a matrix.
pub fn transpose(arg: &NodeRef) -> Result<NodeRef> {
    let dims = match arg.ty() {
        Some(ty) if ty.rank() == 2 => ty.shape().dims().to_vec(),
        _ => {
            return Err(ValidationError::RankMismatch {
                op: "Reshape",
                message: format!("transpose needs a single rank 2 input, got '{}'", arg.name()),
            })
        }
    };
    reshape(arg, vec![1, 0], [dims[1], dims[0]])
}

/// Drop unit axes from `data`.
///
/// With an empty `axes` list every axis of extent 1 is removed; otherwise
/// only the listed ones, each of which must have extent 1.
pub fn squeeze(data: &NodeRef, axes: &[usize]) -> Result<NodeRef> {
    let ty = data.ty().ok_or(ValidationError::MultiOutputInput {
        op: "Reshape",
        index: 0,
        outputs: data.outputs().len(),
    })?;
    let dims = ty.shape().dims();
    for &axis in axes {
        match dims.get(axis) {
            Some(1) => {}
            Some(extent) => {
                return Err(ValidationError::InvalidAttribute {
                    op: "Reshape",
                    message: format!("cannot squeeze axis {} with extent {}", axis, extent),
                })
            }
            None => {
                return Err(ValidationError::InvalidAttribute {
                    op: "Reshape",
                    message: format!("squeeze axis {} out of range for {}", axis, ty.shape()),
                })
            }
        }
    }
    let kept: Vec<usize> = dims
        .iter()
        .enumerate()
        .filter(|&(axis, &extent)| {
            if axes.is_empty() {
                extent != 1
            } else {
                !axes.contains(&axis)
            }
        })
        .map(|(_, &extent)| extent)
        .collect();
    reshape(data, (0..dims.len()).collect(), kept)
}

pub fn get_output_element(producer: &NodeRef, index: usize) -> Result<NodeRef> {
    Node::new(OpKind::GetOutputElement { index }, vec![Arc::clone(producer)])
}

/// Unfused LSTM cell; see [`crate::lstm`] for the input order.
#[allow(clippy::too_many_arguments)]
pub fn lstm(
    input_xt_1: &NodeRef,
    i2h_weights: &NodeRef,
    hidden_state_ht_1: &NodeRef,
    h2h_weights: &NodeRef,
    i2h_bias: &NodeRef,
    h2h_bias: &NodeRef,
    cell_state_ct_1: &NodeRef,
) -> Result<NodeRef> {
    Node::new(
        OpKind::Lstm { fused: false },
        [
            input_xt_1,
            i2h_weights,
            hidden_state_ht_1,
            h2h_weights,
            i2h_bias,
            h2h_bias,
            cell_state_ct_1,
        ]
        .into_iter()
        .cloned()
        .collect(),
    )
}

/// Fused LSTM cell over pre-stacked state and combined bias.
pub fn lstm_fused(
    src_layer: &NodeRef,
    src_iter: &NodeRef,
    weights_layer: &NodeRef,
    weights_iter: &NodeRef,
    bias: &NodeRef,
) -> Result<NodeRef> {
    Node::new(
        OpKind::Lstm { fused: true },
        [src_layer, src_iter, weights_layer, weights_iter, bias]
            .into_iter()
            .cloned()
            .collect(),
    )
}
