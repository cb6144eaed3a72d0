use crate::wrapper::TensorViewWrapper;
use crate::writer::{c_literal, CodeWriter};

/// `out = a . b`.
///
/// A scalar operand scales the other one. Otherwise the last axis of `a` is
/// contracted with the first axis of `b`, which flattens to an
/// `[m, k] x [k, n]` product over row-major buffers.
pub(super) fn emit_dot(
    w: &mut CodeWriter,
    out: &TensorViewWrapper,
    a: &TensorViewWrapper,
    b: &TensorViewWrapper,
) {
    let a_dims = a.shape().dims();
    let b_dims = b.shape().dims();

    if a_dims.is_empty() || b_dims.is_empty() {
        let (scalar, tensor) = if a_dims.is_empty() { (a, b) } else { (b, a) };
        w.open(format!("for (size_t i = 0; i < {}; ++i)", out.element_count()));
        w.line(format!(
            "{}[i] = ({})({}[0] * {}[i]);",
            out.name(),
            out.c_type(),
            scalar.name(),
            tensor.name()
        ));
        w.close();
        return;
    }

    let k = a_dims[a_dims.len() - 1];
    let m: usize = a_dims[..a_dims.len() - 1].iter().product();
    let n: usize = b_dims[1..].iter().product();
    let ct = out.c_type();
    let zero = c_literal(out.element_type(), 0.0);

    w.open(format!("for (size_t m = 0; m < {m}; ++m)"));
    w.open(format!("for (size_t n = 0; n < {n}; ++n)"));
    w.line(format!("{ct} acc = {zero};"));
    w.open(format!("for (size_t k = 0; k < {k}; ++k)"));
    w.line(format!(
        "acc += {}[m * {k} + k] * {}[k * {n} + n];",
        a.name(),
        b.name()
    ));
    w.close();
    w.line(format!("{}[m * {n} + n] = acc;", out.name()));
    w.close();
    w.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_tensor::{DType, TensorDescriptor, TensorType};

    #[test]
    fn test_matrix_vector() {
        let a = TensorDescriptor::new("a_0", TensorType::new(DType::F32, [2, 3]));
        let v = TensorDescriptor::new("v_0", TensorType::new(DType::F32, [3]));
        let o = TensorDescriptor::new("o_0", TensorType::new(DType::F32, [2]));
        let mut w = CodeWriter::new();
        emit_dot(
            &mut w,
            &TensorViewWrapper::new(&o, ""),
            &TensorViewWrapper::new(&a, ""),
            &TensorViewWrapper::new(&v, ""),
        );
        let src = w.finish();
        assert!(src.contains("m < 2"));
        assert!(src.contains("n < 1"));
        assert!(src.contains("float acc = 0.0f;"));
        assert!(src.contains("acc += a_0[m * 3 + k] * v_0[k * 1 + n];"));
        assert!(src.contains("o_0[m * 1 + n] = acc;"));
    }

    #[test]
    fn test_scalar_scales() {
        let s = TensorDescriptor::new("s_0", TensorType::scalar(DType::I32));
        let x = TensorDescriptor::new("x_0", TensorType::new(DType::I32, [5]));
        let o = TensorDescriptor::new("o_0", TensorType::new(DType::I32, [5]));
        let mut w = CodeWriter::new();
        emit_dot(
            &mut w,
            &TensorViewWrapper::new(&o, ""),
            &TensorViewWrapper::new(&x, ""),
            &TensorViewWrapper::new(&s, ""),
        );
        assert!(w.finish().contains("o_0[i] = (int32_t)(s_0[0] * x_0[i]);"));
    }
}
