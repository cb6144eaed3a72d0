use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tc_tensor::{TensorDescriptor, TensorType};

use crate::error::{Result, ValidationError};
use crate::op::OpKind;

/// Shared handle to an immutable node. Consumers hold their inputs through
/// it, so a node lives as long as anything downstream of it.
pub type NodeRef = Arc<Node>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One operation in the graph together with its validated output types.
pub struct Node {
    id: NodeId,
    name: String,
    op: OpKind,
    inputs: Vec<NodeRef>,
    outputs: Vec<Arc<TensorDescriptor>>,
}

impl Node {
    /// Validate `inputs` against `op` and build the node, named `"{Op}_{id}"`.
    pub fn new(op: OpKind, inputs: Vec<NodeRef>) -> Result<NodeRef> {
        Node::build(None, op, inputs)
    }

    /// Like [`Node::new`] with an explicit name.
    pub fn with_name(name: impl Into<String>, op: OpKind, inputs: Vec<NodeRef>) -> Result<NodeRef> {
        Node::build(Some(name.into()), op, inputs)
    }

    /// Parameters only echo their declared type, so they skip validation.
    pub(crate) fn parameter(name: Option<String>, ty: TensorType) -> NodeRef {
        Node::assemble(name, OpKind::Parameter { ty: ty.clone() }, Vec::new(), vec![ty])
    }

    fn build(name: Option<String>, op: OpKind, inputs: Vec<NodeRef>) -> Result<NodeRef> {
        let output_types = op.infer(&inputs)?;
        Ok(Node::assemble(name, op, inputs, output_types))
    }

    fn assemble(
        name: Option<String>,
        op: OpKind,
        inputs: Vec<NodeRef>,
        output_types: Vec<TensorType>,
    ) -> NodeRef {
        let id = NodeId::next();
        let name = name.unwrap_or_else(|| format!("{}_{}", op.name(), id));
        let outputs = output_types
            .into_iter()
            .enumerate()
            .map(|(i, ty)| Arc::new(TensorDescriptor::new(format!("{}_{}", name, i), ty)))
            .collect();
        log::trace!("created node {} ({})", name, op);
        Arc::new(Node {
            id,
            name,
            op,
            inputs,
            outputs,
        })
    }

    /// A structurally new node with the same operation over `new_inputs`.
    ///
    /// The input count must match the arity of this node's construction
    /// variant; the full validation runs again on the new inputs.
    pub fn copy_with_new_inputs(&self, new_inputs: Vec<NodeRef>) -> Result<NodeRef> {
        if new_inputs.len() != self.op.arity() {
            return Err(ValidationError::ArityMismatch {
                op: self.op.name(),
                expected: self.op.arity(),
                got: new_inputs.len(),
            });
        }
        Node::new(self.op.clone(), new_inputs)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &OpKind {
        &self.op
    }

    pub fn op_name(&self) -> &'static str {
        self.op.name()
    }

    pub fn inputs(&self) -> &[NodeRef] {
        &self.inputs
    }

    /// Alias of [`Node::inputs`].
    pub fn arguments(&self) -> &[NodeRef] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Option<&NodeRef> {
        self.inputs.get(index)
    }

    pub fn outputs(&self) -> &[Arc<TensorDescriptor>] {
        &self.outputs
    }

    pub fn output_type(&self, index: usize) -> Option<&TensorType> {
        self.outputs.get(index).map(|d| d.tensor_type())
    }

    /// The type of a single-output node; `None` for multi-output nodes.
    pub fn ty(&self) -> Option<&TensorType> {
        match self.outputs.as_slice() {
            [only] => Some(only.tensor_type()),
            _ => None,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.op, OpKind::Parameter { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.op, OpKind::Constant { .. })
    }

    /// True for anything computed from inputs.
    pub fn is_op(&self) -> bool {
        !self.is_parameter() && !self.is_constant()
    }

    pub fn is_same(&self, other: &Node) -> bool {
        self.id == other.id
    }
}

// Long chains would otherwise be released recursively, one stack frame
// per node.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.inputs);
        while let Some(input) = pending.pop() {
            if let Ok(mut node) = Arc::try_unwrap(input) {
                pending.append(&mut node.inputs);
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<&str> = self.inputs.iter().map(|n| n.name()).collect();
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|d| d.tensor_type().to_string())
            .collect();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("op", &self.op)
            .field("inputs", &inputs)
            .field("outputs", &outputs)
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}(", self.name, self.op)?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", input.name)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::BinaryOp;
    use crate::ops;
    use tc_tensor::DType;

    #[test]
    fn test_default_names_and_descriptors() {
        let a = ops::parameter(DType::F32, [2, 3]);
        let b = ops::parameter(DType::F32, [2, 3]);
        let sum = ops::add(&a, &b).unwrap();
        assert_eq!(sum.name(), format!("Add_{}", sum.id()));
        assert_eq!(sum.outputs()[0].name(), format!("{}_0", sum.name()));
        assert_eq!(sum.ty().unwrap(), a.ty().unwrap());
        assert!(sum.id() > b.id());
    }

    #[test]
    fn test_queries() {
        let a = ops::parameter(DType::F64, [4]);
        let c = ops::constant(DType::F64, [4], vec![1.0]).unwrap();
        let neg = ops::negative(&a).unwrap();
        assert!(a.is_parameter() && !a.is_op());
        assert!(c.is_constant() && !c.is_op());
        assert!(neg.is_op());
        assert_eq!(neg.arguments().len(), 1);
        assert!(neg.input(0).unwrap().is_same(&a));
        assert!(neg.input(1).is_none());
    }

    #[test]
    fn test_copy_with_new_inputs_revalidates() {
        let a = ops::parameter(DType::F32, [3]);
        let b = ops::parameter(DType::F32, [3]);
        let sum = ops::add(&a, &b).unwrap();

        let c = ops::parameter(DType::F32, [3]);
        let copy = sum.copy_with_new_inputs(vec![a.clone(), c.clone()]).unwrap();
        assert_eq!(copy.op(), &OpKind::Binary(BinaryOp::Add));
        assert!(copy.inputs()[1].is_same(&c));
        assert!(!copy.is_same(&sum));

        let wide = ops::parameter(DType::F32, [4]);
        let err = sum.copy_with_new_inputs(vec![a.clone(), wide]).unwrap_err();
        assert!(matches!(err, ValidationError::ShapeMismatch { op: "Add", .. }));
    }

    #[test]
    fn test_copy_with_wrong_arity() {
        let a = ops::parameter(DType::F32, [3]);
        let neg = ops::negative(&a).unwrap();
        let err = neg.copy_with_new_inputs(vec![a.clone(), a.clone()]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ArityMismatch {
                op: "Negative",
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn test_multi_output_input_rejected() {
        let inputs = vec![
            ops::parameter(DType::F32, [1, 2]),
            ops::parameter(DType::F32, [4, 2]),
            ops::parameter(DType::F32, [1, 1]),
            ops::parameter(DType::F32, [4, 1]),
            ops::parameter(DType::F32, [4]),
            ops::parameter(DType::F32, [4]),
            ops::parameter(DType::F32, [1, 1]),
        ];
        let cell = Node::new(OpKind::Lstm { fused: false }, inputs).unwrap();
        assert!(cell.ty().is_none());

        let err = ops::negative(&cell).unwrap_err();
        assert!(matches!(err, ValidationError::MultiOutputInput { index: 0, outputs: 2, .. }));

        let h = ops::get_output_element(&cell, 0).unwrap();
        assert!(ops::negative(&h).is_ok());
        assert!(ops::get_output_element(&cell, 2).is_err());
    }

    #[test]
    fn test_display() {
        let ty = TensorType::scalar(DType::I32);
        let a = Node::with_name("a", OpKind::Parameter { ty }, vec![]).unwrap();
        let negative = OpKind::Unary(crate::op::UnaryOp::Negative);
        let neg = Node::with_name("n", negative, vec![a]).unwrap();
        assert_eq!(neg.to_string(), "n = Negative(a)");
        assert_eq!(neg.outputs()[0].name(), "n_0");
    }
}
