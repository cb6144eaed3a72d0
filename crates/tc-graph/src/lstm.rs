//! The LSTM cell, the IR's composite operation.
//!
//! Two construction variants exist. The unfused form takes seven inputs:
//!
//! | # | input               | shape     |
//! |---|---------------------|-----------|
//! | 0 | `input_xt_1`        | `[N, C]`  |
//! | 1 | `i2h_weights`       | `[4H, C]` |
//! | 2 | `hidden_state_ht_1` | `[N, H]`  |
//! | 3 | `h2h_weights`       | `[4H, H]` |
//! | 4 | `i2h_bias`          | `[4H]`    |
//! | 5 | `h2h_bias`          | `[4H]`    |
//! | 6 | `cell_state_ct_1`   | `[N, H]`  |
//!
//! The fused form takes five, with the recurrent state and the biases
//! pre-combined:
//!
//! | # | input           | shape      |
//! |---|-----------------|------------|
//! | 0 | `src_layer`     | `[T*N, C]` |
//! | 1 | `src_iter`      | `[2N, H]` (hidden rows, then cell rows) |
//! | 2 | `weights_layer` | `[4H, C]`  |
//! | 3 | `weights_iter`  | `[4H, H]`  |
//! | 4 | `bias`          | `[4H]`     |
//!
//! Gate rows are ordered input, forget, candidate, output.

use tc_tensor::{DType, TensorType};

use crate::error::{Result, ValidationError};
use crate::node::Node;
use crate::op::{check_same_element_type, OpKind};

const OP: &str = "Lstm";

/// Dimensions of one LSTM cell step, derived from the input shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LstmDims {
    pub batch_size: usize,
    pub layer_feature_size: usize,
    pub iter_feature_size: usize,
    pub num_timesteps: usize,
    pub num_gates_per_cell: usize,
    pub num_cell_states: usize,
    pub fused: bool,
}

impl LstmDims {
    /// Validate the inputs of either variant and derive the cell dimensions.
    pub fn infer(fused: bool, types: &[&TensorType]) -> Result<LstmDims> {
        let expected = if fused { 5 } else { 7 };
        if types.len() != expected {
            return Err(ValidationError::ArityMismatch {
                op: OP,
                expected,
                got: types.len(),
            });
        }
        // Reported before any shape problem, whichever pair differs.
        check_same_element_type(OP, types)?;
        if fused {
            infer_fused(types)
        } else {
            infer_unfused(types)
        }
    }

    /// Recompute the dimensions of an existing `Lstm` node.
    pub fn of(node: &Node) -> Result<LstmDims> {
        let fused = match node.op() {
            OpKind::Lstm { fused } => *fused,
            other => {
                return Err(ValidationError::InvalidAttribute {
                    op: OP,
                    message: format!("'{}' is a {} node", node.name(), other.name()),
                })
            }
        };
        let types: Vec<&TensorType> = node
            .inputs()
            .iter()
            .filter_map(|input| input.output_type(0))
            .collect();
        LstmDims::infer(fused, &types)
    }

    /// The two outputs: hidden state and cell state.
    ///
    /// The fused form returns the cell state stacked under the hidden state,
    /// matching the layout of `src_iter`.
    pub fn output_types(&self, dtype: DType) -> [TensorType; 2] {
        let h = self.iter_feature_size;
        let n = self.batch_size;
        if self.fused {
            [
                TensorType::new(dtype, [self.num_timesteps * n, h]),
                TensorType::new(dtype, [self.num_cell_states * n, h]),
            ]
        } else {
            [
                TensorType::new(dtype, [n, h]),
                TensorType::new(dtype, [n, h]),
            ]
        }
    }

    /// Rows of every weight matrix and length of every bias.
    pub fn gate_rows(&self) -> usize {
        self.num_gates_per_cell * self.iter_feature_size
    }
}

fn infer_unfused(types: &[&TensorType]) -> Result<LstmDims> {
    let (input, i2h_w, hidden, h2h_w, i2h_b, h2h_b, cell) = (
        types[0], types[1], types[2], types[3], types[4], types[5], types[6],
    );

    if input.rank() != i2h_w.rank() {
        return Err(rank_error("input_xt_1 and i2h_weights ranks don't match"));
    }
    if hidden.rank() != h2h_w.rank() {
        return Err(rank_error("hidden_state_ht_1 and h2h_weights ranks don't match"));
    }
    if input.rank() != 2 {
        return Err(rank_error("input_xt_1 must have rank 2"));
    }
    if hidden.rank() != 2 {
        return Err(rank_error("hidden_state_ht_1 must have rank 2"));
    }
    if i2h_b.rank() != 1 || h2h_b.rank() != 1 {
        return Err(rank_error("biases must have rank 1"));
    }

    let dims = LstmDims {
        batch_size: input.shape().dim(0),
        layer_feature_size: input.shape().dim(1),
        iter_feature_size: hidden.shape().dim(1),
        num_timesteps: 1,
        num_gates_per_cell: 4,
        num_cell_states: 2,
        fused: false,
    };

    if input.numel() != dims.num_timesteps * dims.batch_size * dims.layer_feature_size {
        return Err(shape_error("input_xt_1 size is not equal to t*n*c".to_string()));
    }
    if i2h_b.shape().dim(0) != i2h_w.shape().dim(0) || h2h_b.shape().dim(0) != h2h_w.shape().dim(0)
    {
        return Err(shape_error(
            "bias and weight shapes are not compatible".to_string(),
        ));
    }
    if hidden.shape() != cell.shape() {
        return Err(shape_error(format!(
            "hidden state {} and cell state {} must have the same shape",
            hidden.shape(),
            cell.shape()
        )));
    }
    if hidden.shape().dim(0) != dims.batch_size {
        return Err(shape_error(format!(
            "hidden state batch {} does not match input batch {}",
            hidden.shape().dim(0),
            dims.batch_size
        )));
    }
    check_weights(&dims, i2h_w, "i2h_weights", dims.layer_feature_size)?;
    check_weights(&dims, h2h_w, "h2h_weights", dims.iter_feature_size)?;
    Ok(dims)
}

fn infer_fused(types: &[&TensorType]) -> Result<LstmDims> {
    let (src_layer, src_iter, w_layer, w_iter, bias) =
        (types[0], types[1], types[2], types[3], types[4]);

    if src_layer.rank() != w_layer.rank() {
        return Err(rank_error("src_layer and weights_layer ranks don't match"));
    }
    if src_iter.rank() != w_iter.rank() {
        return Err(rank_error("src_iter and weights_iter ranks don't match"));
    }
    if src_layer.rank() != 2 {
        return Err(rank_error("src_layer must have rank 2"));
    }
    if src_iter.rank() != 2 {
        return Err(rank_error("src_iter must have rank 2"));
    }
    if bias.rank() != 1 {
        return Err(rank_error("bias must have rank 1"));
    }

    let num_timesteps = 1;
    let dims = LstmDims {
        batch_size: src_layer.shape().dim(0) / num_timesteps,
        layer_feature_size: src_layer.shape().dim(1),
        iter_feature_size: src_iter.shape().dim(1),
        num_timesteps,
        num_gates_per_cell: 4,
        num_cell_states: 2,
        fused: true,
    };

    if src_layer.numel() != dims.num_timesteps * dims.batch_size * dims.layer_feature_size {
        return Err(shape_error("src_layer size is not equal to t*n*c".to_string()));
    }
    if bias.shape().dim(0) != w_layer.shape().dim(0) || bias.shape().dim(0) != w_iter.shape().dim(0)
    {
        return Err(shape_error(
            "bias and weight shapes are not compatible".to_string(),
        ));
    }
    if src_iter.shape().dim(0) != dims.num_cell_states * dims.batch_size {
        return Err(shape_error(format!(
            "src_iter must stack {} states of batch {}, got {} rows",
            dims.num_cell_states,
            dims.batch_size,
            src_iter.shape().dim(0)
        )));
    }
    check_weights(&dims, w_layer, "weights_layer", dims.layer_feature_size)?;
    check_weights(&dims, w_iter, "weights_iter", dims.iter_feature_size)?;
    Ok(dims)
}

fn check_weights(
    dims: &LstmDims,
    weights: &TensorType,
    name: &str,
    feature_size: usize,
) -> Result<()> {
    let shape = weights.shape();
    if shape.dim(0) != dims.gate_rows() || shape.dim(1) != feature_size {
        return Err(shape_error(format!(
            "{} must be [{}, {}], got {}",
            name,
            dims.gate_rows(),
            feature_size,
            shape
        )));
    }
    Ok(())
}

fn rank_error(message: &str) -> ValidationError {
    ValidationError::RankMismatch {
        op: OP,
        message: message.to_string(),
    }
}

fn shape_error(message: String) -> ValidationError {
    ValidationError::ShapeMismatch { op: OP, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use tc_tensor::Shape;

    fn param(dtype: DType, dims: &[usize]) -> crate::NodeRef {
        ops::parameter(dtype, Shape::from_slice(dims))
    }

    /// Unfused inputs for batch 2, input features 3, hidden 4.
    fn unfused_inputs(dtypes: [DType; 7]) -> Vec<crate::NodeRef> {
        let dims: [&[usize]; 7] = [&[2, 3], &[16, 3], &[2, 4], &[16, 4], &[16], &[16], &[2, 4]];
        dims.iter()
            .zip(dtypes)
            .map(|(d, dtype)| param(dtype, d))
            .collect()
    }

    fn fused_inputs(batch: usize, features: usize, hidden: usize) -> Vec<crate::NodeRef> {
        vec![
            param(DType::F32, &[batch, features]),
            param(DType::F32, &[2 * batch, hidden]),
            param(DType::F32, &[4 * hidden, features]),
            param(DType::F32, &[4 * hidden, hidden]),
            param(DType::F32, &[4 * hidden]),
        ]
    }

    #[test]
    fn test_unfused_outputs() {
        let inputs = unfused_inputs([DType::F32; 7]);
        let node = Node::new(OpKind::Lstm { fused: false }, inputs).unwrap();
        assert_eq!(node.outputs().len(), 2);
        assert_eq!(node.output_type(0).unwrap().shape().dims(), &[2, 4]);
        assert_eq!(node.output_type(1).unwrap().shape().dims(), &[2, 4]);

        let dims = LstmDims::of(&node).unwrap();
        assert_eq!(dims.batch_size, 2);
        assert_eq!(dims.layer_feature_size, 3);
        assert_eq!(dims.iter_feature_size, 4);
        assert!(!dims.fused);
    }

    #[test]
    fn test_fused_outputs() {
        let node = Node::new(OpKind::Lstm { fused: true }, fused_inputs(3, 5, 2)).unwrap();
        assert_eq!(node.output_type(0).unwrap().shape().dims(), &[3, 2]);
        assert_eq!(node.output_type(1).unwrap().shape().dims(), &[6, 2]);
    }

    #[test]
    fn test_fused_outputs_depend_only_on_batch_and_hidden() {
        // Same batch and hidden size, different layer feature sizes and
        // construction order.
        let wide = Node::new(OpKind::Lstm { fused: true }, fused_inputs(4, 7, 3)).unwrap();
        let narrow = Node::new(OpKind::Lstm { fused: true }, fused_inputs(4, 1, 3)).unwrap();
        assert_eq!(wide.output_type(0), narrow.output_type(0));
        assert_eq!(wide.output_type(1), narrow.output_type(1));
    }

    #[test]
    fn test_element_type_mismatch_any_pair() {
        for index in 0..7 {
            let mut dtypes = [DType::F32; 7];
            dtypes[index] = DType::F64;
            let err = Node::new(OpKind::Lstm { fused: false }, unfused_inputs(dtypes)).unwrap_err();
            assert!(
                matches!(err, ValidationError::ElementTypeMismatch { .. }),
                "input {index}: {err}"
            );
            assert!(err.to_string().contains("element type"));
        }
    }

    #[test]
    fn test_element_type_mismatch_fused() {
        let mut inputs = fused_inputs(2, 3, 4);
        inputs[4] = param(DType::I32, &[16]);
        let err = Node::new(OpKind::Lstm { fused: true }, inputs).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ElementTypeMismatch {
                index: 4,
                expected: DType::F32,
                got: DType::I32,
                ..
            }
        ));
    }

    #[test]
    fn test_rank_two_required() {
        let mut inputs = unfused_inputs([DType::F32; 7]);
        inputs[0] = param(DType::F32, &[2, 3, 1]);
        inputs[1] = param(DType::F32, &[16, 3, 1]);
        let err = Node::new(OpKind::Lstm { fused: false }, inputs).unwrap_err();
        assert!(err.to_string().contains("input_xt_1 must have rank 2"));
    }

    #[test]
    fn test_bias_must_match_weights() {
        let mut inputs = unfused_inputs([DType::F32; 7]);
        inputs[4] = param(DType::F32, &[12]);
        let err = Node::new(OpKind::Lstm { fused: false }, inputs).unwrap_err();
        assert!(err.to_string().contains("bias and weight shapes are not compatible"));
    }

    #[test]
    fn test_hidden_and_cell_shapes_must_agree() {
        let mut inputs = unfused_inputs([DType::F32; 7]);
        inputs[6] = param(DType::F32, &[3, 4]);
        let err = Node::new(OpKind::Lstm { fused: false }, inputs).unwrap_err();
        assert!(matches!(err, ValidationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_fused_src_iter_rows() {
        let mut inputs = fused_inputs(2, 3, 4);
        inputs[1] = param(DType::F32, &[2, 4]);
        let err = Node::new(OpKind::Lstm { fused: true }, inputs).unwrap_err();
        assert!(err.to_string().contains("src_iter must stack"));
    }

    #[test]
    fn test_of_rejects_other_ops() {
        let a = param(DType::F32, &[2]);
        let neg = ops::negative(&a).unwrap();
        assert!(LstmDims::of(&neg).is_err());
    }
}
