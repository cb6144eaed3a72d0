use std::ffi::c_void;
use std::sync::Arc;

use tc_codegen::{generate, Target};
use tc_graph::Graph;
use tc_tensor::{Tensor, TensorType};

use crate::engine::ExecutionEngine;
use crate::error::{InvokeError, Result};
use crate::toolchain::Toolchain;

/// Generate, compile and load `graph` for the host CPU.
pub fn compile(graph: &Graph, toolchain: &Arc<Toolchain>) -> Result<CompiledFunction> {
    let unit = generate(graph, Target::Cpu)?;
    let entry = unit.entry().to_string();

    let mut engine = ExecutionEngine::new(Arc::clone(toolchain));
    engine.bind(unit)?;
    engine.finalize()?;
    // Resolve once up front so a missing symbol surfaces here, not on call.
    engine.get_entry_point(&entry)?;

    let inputs = graph
        .parameters()
        .iter()
        .filter_map(|p| p.ty().cloned())
        .collect();
    let outputs = graph
        .results()
        .iter()
        .filter_map(|r| r.ty().cloned())
        .collect();
    Ok(CompiledFunction {
        engine,
        entry,
        inputs,
        outputs,
    })
}

/// A graph compiled to native code, callable on host tensors.
#[derive(Debug)]
pub struct CompiledFunction {
    engine: ExecutionEngine,
    entry: String,
    inputs: Vec<TensorType>,
    outputs: Vec<TensorType>,
}

impl CompiledFunction {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn input_types(&self) -> &[TensorType] {
        &self.inputs
    }

    pub fn output_types(&self) -> &[TensorType] {
        &self.outputs
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Run the function, writing each result into the matching `outputs`
    /// tensor. Counts and types are checked before any native code runs.
    pub fn call(&self, inputs: &[&Tensor], outputs: &mut [Tensor]) -> Result<()> {
        self.check(inputs, outputs)?;
        let entry = self.engine.get_entry_point(&self.entry)?;

        let in_ptrs: Vec<*mut c_void> = inputs
            .iter()
            .map(|t| t.storage().as_ptr() as *mut c_void)
            .collect();
        let out_ptrs: Vec<*mut c_void> = outputs
            .iter_mut()
            .map(|t| t.storage_mut().as_mut_ptr())
            .collect();
        unsafe { entry.invoke(&in_ptrs, &out_ptrs) };
        Ok(())
    }

    /// Run the function into freshly allocated result tensors.
    pub fn run(&self, inputs: &[&Tensor]) -> Result<Vec<Tensor>> {
        let mut outputs: Vec<Tensor> = self.outputs.iter().map(Tensor::zeros).collect();
        self.call(inputs, &mut outputs)?;
        Ok(outputs)
    }

    fn check(
        &self,
        inputs: &[&Tensor],
        outputs: &[Tensor],
    ) -> std::result::Result<(), InvokeError> {
        if inputs.len() != self.inputs.len() {
            return Err(InvokeError::InputCount {
                expected: self.inputs.len(),
                got: inputs.len(),
            });
        }
        if outputs.len() != self.outputs.len() {
            return Err(InvokeError::OutputCount {
                expected: self.outputs.len(),
                got: outputs.len(),
            });
        }
        for (index, (tensor, expected)) in inputs.iter().zip(&self.inputs).enumerate() {
            if tensor.tensor_type() != expected {
                return Err(InvokeError::InputType {
                    index,
                    expected: expected.clone(),
                    got: tensor.tensor_type().clone(),
                });
            }
        }
        for (index, (tensor, expected)) in outputs.iter().zip(&self.outputs).enumerate() {
            if tensor.tensor_type() != expected {
                return Err(InvokeError::OutputType {
                    index,
                    expected: expected.clone(),
                    got: tensor.tensor_type().clone(),
                });
            }
        }
        Ok(())
    }
}
