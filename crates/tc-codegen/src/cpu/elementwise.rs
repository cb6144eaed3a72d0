use tc_graph::{BinaryOp, UnaryOp};
use tc_tensor::DType;

use crate::wrapper::TensorViewWrapper;
use crate::writer::{c_literal, linear_index_expr, CodeWriter};

/// libm spelling of `name` for `dtype` (`expf` for f32, `exp` otherwise).
pub(super) fn math_fn(dtype: DType, name: &str) -> String {
    match dtype {
        DType::F32 => format!("{name}f"),
        _ => name.to_string(),
    }
}

pub(super) fn unary_expr(op: UnaryOp, dtype: DType, x: &str) -> String {
    let zero = c_literal(dtype, 0.0);
    let one = c_literal(dtype, 1.0);
    match op {
        UnaryOp::Negative => format!("-{x}"),
        UnaryOp::Exp => format!("{}({x})", math_fn(dtype, "exp")),
        UnaryOp::Tanh => format!("{}({x})", math_fn(dtype, "tanh")),
        UnaryOp::Sigmoid => format!("{one} / ({one} + {}(-{x}))", math_fn(dtype, "exp")),
        UnaryOp::Relu => format!("{x} > {zero} ? {x} : {zero}"),
    }
}

pub(super) fn binary_expr(op: BinaryOp, a: &str, b: &str) -> String {
    match op {
        BinaryOp::Add => format!("{a} + {b}"),
        BinaryOp::Subtract => format!("{a} - {b}"),
        BinaryOp::Multiply => format!("{a} * {b}"),
        BinaryOp::Divide => format!("{a} / {b}"),
        BinaryOp::Maximum => format!("{a} > {b} ? {a} : {b}"),
    }
}

pub(super) fn emit_unary(
    w: &mut CodeWriter,
    op: UnaryOp,
    out: &TensorViewWrapper,
    arg: &TensorViewWrapper,
) {
    let x = format!("{}[i]", arg.name());
    let expr = unary_expr(op, arg.element_type(), &x);
    w.open(format!("for (size_t i = 0; i < {}; ++i)", out.element_count()));
    w.line(format!("{}[i] = ({})({});", out.name(), out.c_type(), expr));
    w.close();
}

pub(super) fn emit_binary(
    w: &mut CodeWriter,
    op: BinaryOp,
    out: &TensorViewWrapper,
    lhs: &TensorViewWrapper,
    rhs: &TensorViewWrapper,
) {
    let a = format!("{}[i]", lhs.name());
    let b = format!("{}[i]", rhs.name());
    w.open(format!("for (size_t i = 0; i < {}; ++i)", out.element_count()));
    w.line(format!("{}[i] = ({})({});", out.name(), out.c_type(), binary_expr(op, &a, &b)));
    w.close();
}

pub(super) fn emit_memcpy(w: &mut CodeWriter, dst: &str, src: &str, bytes: usize) {
    if dst == src || bytes == 0 {
        return;
    }
    w.line(format!("memcpy({dst}, {src}, {bytes});"));
}

/// Reorder the axes of `input` into `out`; the output shape only
/// reinterprets the permuted elements, so identity orders are a copy.
pub(super) fn emit_reshape(
    w: &mut CodeWriter,
    axis_order: &[usize],
    out: &TensorViewWrapper,
    input: &TensorViewWrapper,
) {
    let is_identity = axis_order.iter().enumerate().all(|(i, &axis)| i == axis);
    if is_identity {
        emit_memcpy(w, out.name(), input.name(), out.size());
        return;
    }

    let elem_size = input.element_type().size_in_bytes();
    let in_dims = input.shape().dims();
    let permuted: Vec<usize> = axis_order.iter().map(|&a| in_dims[a]).collect();
    let in_strides: Vec<usize> = axis_order
        .iter()
        .map(|&a| input.strides()[a] / elem_size)
        .collect();
    w.for_each_index(&permuted, "i", |w, idx| {
        let src = idx
            .iter()
            .zip(&in_strides)
            .map(|(i, stride)| format!("{i} * {stride}"))
            .collect::<Vec<_>>()
            .join(" + ");
        w.line(format!(
            "{}[{}] = {}[{}];",
            out.name(),
            linear_index_expr(&permuted, idx),
            input.name(),
            src
        ));
    });
}
