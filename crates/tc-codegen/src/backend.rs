use std::fmt::Debug;

use tc_graph::{Graph, GraphError};

use crate::cpu::CpuEmitter;
use crate::error::Result;
use crate::gpu::GpuEmitter;
use crate::target::Target;
use crate::unit::CompilationUnit;
use crate::writer::sanitize_identifier;

/// A code generator for one target.
pub trait Emitter: Send + Sync + Debug {
    fn target(&self) -> Target;

    /// Lower `graph` into a unit whose entry function is called `entry`.
    fn emit(&self, graph: &Graph, entry: &str) -> Result<CompilationUnit>;
}

/// The emitter for `target`.
pub fn emitter(target: Target) -> Box<dyn Emitter> {
    match target {
        Target::Cpu => Box::new(CpuEmitter),
        Target::Gpu => Box::new(GpuEmitter),
    }
}

/// Lower `graph` for `target`.
pub fn generate(graph: &Graph, target: Target) -> Result<CompilationUnit> {
    if graph.results().is_empty() {
        return Err(GraphError::NoResults(graph.name().to_string()).into());
    }
    let entry = entry_name(graph.name());
    let unit = emitter(target).emit(graph, &entry)?;
    log::debug!(
        "generated {} unit '{}': {} nodes, {} bytes of source",
        target,
        entry,
        graph.node_count(),
        unit.source().len()
    );
    Ok(unit)
}

/// Entry symbol for a graph: its name as a C identifier, prefixed so it
/// never collides with the C library.
pub fn entry_name(graph_name: &str) -> String {
    format!("tc_{}", sanitize_identifier(graph_name).trim_start_matches('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_graph::ops;
    use tc_tensor::DType;

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name("mlp"), "tc_mlp");
        assert_eq!(entry_name("my model.v2"), "tc_my_model_v2");
        assert_eq!(entry_name(""), "tc_");
    }

    #[test]
    fn test_generate_rejects_graph_without_results() {
        let a = ops::parameter(DType::F32, [2]);
        let graph = Graph::new("empty", vec![a], vec![]).unwrap();
        let err = generate(&graph, Target::Cpu).unwrap_err();
        assert!(err.to_string().contains("has no results"));
    }

    #[test]
    fn test_emitter_targets() {
        assert_eq!(emitter(Target::Cpu).target(), Target::Cpu);
        assert_eq!(emitter(Target::Gpu).target(), Target::Gpu);
    }
}
