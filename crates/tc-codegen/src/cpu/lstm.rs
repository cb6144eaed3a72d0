use tc_graph::LstmDims;

use super::elementwise::math_fn;
use crate::wrapper::TensorViewWrapper;
use crate::writer::{c_literal, CodeWriter};

/// One LSTM cell step.
///
/// Gate pre-activations for the whole batch go to a scratch buffer first,
/// `gates[n][r] = b[r] + x[n] . w_layer[r] + h[n] . w_iter[r]`, then the
/// state update reads the four gate blocks in input, forget, candidate,
/// output order.
pub(super) fn emit_lstm(
    w: &mut CodeWriter,
    dims: &LstmDims,
    outputs: [&TensorViewWrapper; 2],
    inputs: &[TensorViewWrapper],
) {
    let ct = outputs[0].c_type();
    let dtype = outputs[0].element_type();
    let exp = math_fn(dtype, "exp");
    let tanh = math_fn(dtype, "tanh");
    let one = c_literal(dtype, 1.0);

    let n = dims.batch_size;
    let c = dims.layer_feature_size;
    let h = dims.iter_feature_size;
    let rows = dims.gate_rows();

    // x, w_layer, h_prev, w_iter, bias terms, c_prev.
    let (x, w_layer, w_iter) = if dims.fused {
        (inputs[0].name(), inputs[2].name(), inputs[3].name())
    } else {
        (inputs[0].name(), inputs[1].name(), inputs[3].name())
    };
    let (h_prev, c_prev) = if dims.fused {
        (inputs[1].name().to_string(), format!("({} + {})", inputs[1].name(), n * h))
    } else {
        (inputs[2].name().to_string(), inputs[6].name().to_string())
    };
    let bias = if dims.fused {
        format!("{}[r]", inputs[4].name())
    } else {
        format!("{}[r] + {}[r]", inputs[4].name(), inputs[5].name())
    };
    let (h_out, c_out) = if dims.fused {
        (outputs[0].name().to_string(), format!("({} + {})", outputs[1].name(), n * h))
    } else {
        (outputs[0].name().to_string(), outputs[1].name().to_string())
    };

    w.line(format!("{ct} *gates = ({ct} *)malloc({} * sizeof({ct}));", n * rows));
    w.open(format!("for (size_t n = 0; n < {n}; ++n)"));
    w.open(format!("for (size_t r = 0; r < {rows}; ++r)"));
    w.line(format!("{ct} acc = {bias};"));
    w.open(format!("for (size_t k = 0; k < {c}; ++k)"));
    w.line(format!("acc += {x}[n * {c} + k] * {w_layer}[r * {c} + k];"));
    w.close();
    w.open(format!("for (size_t k = 0; k < {h}; ++k)"));
    w.line(format!("acc += {h_prev}[n * {h} + k] * {w_iter}[r * {h} + k];"));
    w.close();
    w.line(format!("gates[n * {rows} + r] = acc;"));
    w.close();
    w.close();

    w.open(format!("for (size_t n = 0; n < {n}; ++n)"));
    w.open(format!("for (size_t j = 0; j < {h}; ++j)"));
    w.line(format!("const {ct} *g = gates + n * {rows};"));
    w.line(format!("{ct} ig = {one} / ({one} + {exp}(-g[j]));"));
    w.line(format!("{ct} fg = {one} / ({one} + {exp}(-g[{h} + j]));"));
    w.line(format!("{ct} cg = {tanh}(g[{} + j]);", 2 * h));
    w.line(format!("{ct} og = {one} / ({one} + {exp}(-g[{} + j]));", 3 * h));
    w.line(format!("{ct} ct = fg * {c_prev}[n * {h} + j] + ig * cg;"));
    w.line(format!("{c_out}[n * {h} + j] = ct;"));
    w.line(format!("{h_out}[n * {h} + j] = og * {tanh}(ct);"));
    w.close();
    w.close();

    if dims.fused {
        // The second output stacks hidden rows above the cell rows.
        w.line(format!(
            "memcpy({}, {}, {});",
            outputs[1].name(),
            h_out,
            n * h * dtype.size_in_bytes()
        ));
    }
    w.line("free(gates);");
}
