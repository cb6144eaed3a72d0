use tc_tensor::{DType, Shape, TensorDescriptor};

/// A tensor as seen by generated code: the descriptor's layout plus the
/// variable name the code uses for it.
///
/// The wrapper borrows the descriptor, so it can never outlive the node that
/// owns it.
#[derive(Debug, Clone)]
pub struct TensorViewWrapper<'a> {
    descriptor: &'a TensorDescriptor,
    alias: String,
}

impl<'a> TensorViewWrapper<'a> {
    /// Wrap `descriptor`; an empty `alias` means the descriptor's own name.
    pub fn new(descriptor: &'a TensorDescriptor, alias: impl Into<String>) -> Self {
        TensorViewWrapper {
            descriptor,
            alias: alias.into(),
        }
    }

    /// Size of the tensor in bytes.
    pub fn size(&self) -> usize {
        self.descriptor.layout().size()
    }

    pub fn shape(&self) -> &'a Shape {
        self.descriptor.layout().shape()
    }

    /// Byte strides, one per dimension.
    pub fn strides(&self) -> &'a [usize] {
        self.descriptor.layout().strides()
    }

    pub fn element_type(&self) -> DType {
        self.descriptor.layout().element_type()
    }

    pub fn element_count(&self) -> usize {
        self.shape().numel()
    }

    pub fn name(&self) -> &str {
        if self.alias.is_empty() {
            self.descriptor.name()
        } else {
            &self.alias
        }
    }

    pub fn c_type(&self) -> &'static str {
        self.element_type().c_type_name()
    }

    pub fn descriptor(&self) -> &'a TensorDescriptor {
        self.descriptor
    }
}
