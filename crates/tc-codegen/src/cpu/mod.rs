//! Lowering to a single C translation unit.
//!
//! The unit exports three functions:
//! - `void {entry}(void **inputs, void **outputs)`: parameters are read from
//!   `inputs[i]` in declaration order, results written to `outputs[j]`
//! - `void {entry}_static_init(void)`: materializes constants
//! - `void {entry}_static_fini(void)`: releases them
//!
//! Temporaries are heap buffers allocated where they are defined and freed
//! right after their last use.

mod elementwise;
mod lstm;
mod matmul;

use std::collections::{HashMap, HashSet};

use tc_graph::{Graph, Liveness, LstmDims, Node, NodeId, NodeRef, OpKind};
use tc_tensor::{DType, TensorDescriptor};

use crate::backend::Emitter;
use crate::error::{CodegenError, Result};
use crate::target::Target;
use crate::unit::CompilationUnit;
use crate::wrapper::TensorViewWrapper;
use crate::writer::{c_literal, sanitize_identifier, CodeWriter};

const HEADERS: [&str; 4] = ["math.h", "stdint.h", "stdlib.h", "string.h"];

#[derive(Debug, Default, Clone, Copy)]
pub struct CpuEmitter;

impl Emitter for CpuEmitter {
    fn target(&self) -> Target {
        Target::Cpu
    }

    fn emit(&self, graph: &Graph, entry: &str) -> Result<CompilationUnit> {
        let liveness = graph.liveness();
        check_element_types(&liveness)?;
        let mut lowering = CpuLowering::new(graph, &liveness, entry);
        lowering.lower()?;
        Ok(lowering.finish())
    }
}

fn check_element_types(liveness: &Liveness) -> Result<()> {
    for node in liveness.order() {
        for output in node.outputs() {
            let dtype = output.tensor_type().dtype();
            let supported = match node.op() {
                OpKind::Lstm { .. } => dtype.is_float() && dtype != DType::F16,
                _ => dtype != DType::F16,
            };
            if !supported {
                return Err(CodegenError::UnsupportedElementType {
                    op: node.op_name(),
                    dtype,
                    target: Target::Cpu,
                });
            }
        }
    }
    Ok(())
}

struct CpuLowering<'g> {
    graph: &'g Graph,
    liveness: &'g Liveness,
    entry: &'g str,
    views: HashMap<(NodeId, usize), TensorViewWrapper<'g>>,
    names: HashSet<String>,
    /// First result slot of every node bound directly to `outputs[j]`.
    bound_results: HashMap<NodeId, usize>,
    /// Result slots filled by copying once the node is defined.
    copied_results: HashMap<NodeId, Vec<usize>>,
    statics: CodeWriter,
    init: CodeWriter,
    fini: CodeWriter,
    body: CodeWriter,
}

impl<'g> CpuLowering<'g> {
    fn new(graph: &'g Graph, liveness: &'g Liveness, entry: &'g str) -> Self {
        let mut bound_results = HashMap::new();
        let mut copied_results: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (slot, result) in graph.results().iter().enumerate() {
            let owns_buffer =
                result.is_op() && !matches!(result.op(), OpKind::GetOutputElement { .. });
            if owns_buffer && !bound_results.contains_key(&result.id()) {
                bound_results.insert(result.id(), slot);
            } else {
                copied_results.entry(result.id()).or_default().push(slot);
            }
        }

        let names = ["inputs", "outputs", "gates", "acc"]
            .into_iter()
            .map(String::from)
            .chain([entry.to_string()])
            .collect();

        CpuLowering {
            graph,
            liveness,
            entry,
            views: HashMap::new(),
            names,
            bound_results,
            copied_results,
            statics: CodeWriter::new(),
            init: CodeWriter::new(),
            fini: CodeWriter::new(),
            body: CodeWriter::new(),
        }
    }

    fn lower(&mut self) -> Result<()> {
        let params: HashMap<NodeId, usize> = self
            .graph
            .parameters()
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id(), i))
            .collect();

        self.init.open(format!("void {}_static_init(void)", self.entry));
        self.fini.open(format!("void {}_static_fini(void)", self.entry));
        self.body.open(format!("void {}(void **inputs, void **outputs)", self.entry));

        let liveness: &'g Liveness = self.liveness;
        for (position, node) in liveness.order().iter().enumerate() {
            match node.op() {
                OpKind::Parameter { .. } => {
                    let view = self.declare(node, 0)?;
                    let slot = params.get(&node.id()).copied().unwrap_or_default();
                    self.body.line(format!(
                        "{ct} *{name} = ({ct} *)inputs[{slot}];",
                        ct = view.c_type(),
                        name = view.name()
                    ));
                }
                OpKind::Constant { values, .. } => self.lower_constant(node, values)?,
                OpKind::GetOutputElement { index } => {
                    let producer = &node.inputs()[0];
                    let source = self.view(producer, *index)?;
                    let alias = source.name().to_string();
                    let descriptor: &'g TensorDescriptor = &node.outputs()[0];
                    self.views
                        .insert((node.id(), 0), TensorViewWrapper::new(descriptor, alias));
                }
                _ => self.lower_op(node)?,
            }

            if let Some(slots) = self.copied_results.get(&node.id()) {
                let view = self.view(node, 0)?;
                for slot in slots {
                    let dst = format!("outputs[{slot}]");
                    elementwise::emit_memcpy(&mut self.body, &dst, view.name(), view.size());
                }
            }

            for dead in liveness.freed_after(position) {
                for index in 0..dead.outputs().len() {
                    let view = self.view(dead, index)?;
                    self.body.line(format!("free({});", view.name()));
                }
            }
        }

        self.init.close();
        self.fini.close();
        self.body.close();
        Ok(())
    }

    fn lower_constant(&mut self, node: &'g NodeRef, values: &[f64]) -> Result<()> {
        let view = self.declare(node, 0)?;
        let (ct, name) = (view.c_type(), view.name());
        let dtype = view.element_type();
        let count = view.element_count();

        self.statics.line(format!("static {ct} *{name} = NULL;"));
        self.init.line(format!("{name} = ({ct} *)malloc({});", view.size()));
        match values {
            [] => {}
            _ if count == 0 => {}
            [splat] => {
                self.init.open(format!("for (size_t i = 0; i < {count}; ++i)"));
                self.init.line(format!("{name}[i] = {};", c_literal(dtype, *splat)));
                self.init.close();
            }
            values => {
                self.init.open("");
                self.init.line(format!("static const {ct} data[{count}] = {{"));
                for chunk in values.chunks(8) {
                    let literals: Vec<String> =
                        chunk.iter().map(|v| c_literal(dtype, *v)).collect();
                    self.init.line(format!("    {},", literals.join(", ")));
                }
                self.init.line("};");
                self.init.line(format!("memcpy({name}, data, sizeof data);"));
                self.init.close();
            }
        }
        self.fini.line(format!("free({name});"));
        self.fini.line(format!("{name} = NULL;"));
        Ok(())
    }

    fn lower_op(&mut self, node: &'g NodeRef) -> Result<()> {
        let mut outputs = Vec::with_capacity(node.outputs().len());
        for index in 0..node.outputs().len() {
            let view = self.declare(node, index)?;
            let line = match self.bound_results.get(&node.id()) {
                Some(slot) => format!(
                    "{ct} *{name} = ({ct} *)outputs[{slot}];",
                    ct = view.c_type(),
                    name = view.name()
                ),
                None => format!(
                    "{ct} *{name} = ({ct} *)malloc({size});",
                    ct = view.c_type(),
                    name = view.name(),
                    size = view.size()
                ),
            };
            self.body.line(line);
            outputs.push(view);
        }
        let inputs = node
            .inputs()
            .iter()
            .map(|input| self.view(input, 0))
            .collect::<Result<Vec<_>>>()?;

        self.body.line(format!("/* {} */", node.op()));
        let w = &mut self.body;
        w.open("");
        match node.op() {
            OpKind::Unary(op) => elementwise::emit_unary(w, *op, &outputs[0], &inputs[0]),
            OpKind::Binary(op) => {
                elementwise::emit_binary(w, *op, &outputs[0], &inputs[0], &inputs[1])
            }
            OpKind::Dot => matmul::emit_dot(w, &outputs[0], &inputs[0], &inputs[1]),
            OpKind::Reshape { axis_order, .. } => {
                elementwise::emit_reshape(w, axis_order, &outputs[0], &inputs[0])
            }
            OpKind::Lstm { .. } => {
                let dims = LstmDims::of(node).map_err(tc_graph::GraphError::from)?;
                lstm::emit_lstm(w, &dims, [&outputs[0], &outputs[1]], &inputs);
            }
            OpKind::Parameter { .. }
            | OpKind::Constant { .. }
            | OpKind::GetOutputElement { .. } => {
                return Err(CodegenError::UnsupportedOp {
                    op: node.op_name(),
                    target: Target::Cpu,
                })
            }
        }
        w.close();
        Ok(())
    }

    /// Register the variable for output `index` of `node`.
    fn declare(&mut self, node: &'g Node, index: usize) -> Result<TensorViewWrapper<'g>> {
        let descriptor: &'g TensorDescriptor = &node.outputs()[index];
        let own = descriptor.name();
        let alias = if sanitize_identifier(own) == own && !self.names.contains(own) {
            String::new()
        } else {
            let base = sanitize_identifier(own);
            let mut candidate = format!("{}_v{}", base, node.id());
            while self.names.contains(&candidate) {
                candidate.push('_');
            }
            candidate
        };
        let view = TensorViewWrapper::new(descriptor, alias);
        self.names.insert(view.name().to_string());
        self.views.insert((node.id(), index), view.clone());
        Ok(view)
    }

    fn view(&self, node: &Node, index: usize) -> Result<TensorViewWrapper<'g>> {
        self.views
            .get(&(node.id(), index))
            .cloned()
            .ok_or_else(|| tc_graph::GraphError::NodeNotInGraph(node.name().to_string()).into())
    }

    fn finish(self) -> CompilationUnit {
        let mut source = CodeWriter::new();
        source.line(format!("/* {} */", self.entry));
        for header in HEADERS {
            source.line(format!("#include <{header}>"));
        }
        source.blank();
        if !self.statics.as_str().is_empty() {
            source.append(&self.statics);
            source.blank();
        }
        source.append(&self.init);
        source.blank();
        source.append(&self.fini);
        source.blank();
        source.append(&self.body);

        let inputs = self
            .graph
            .parameters()
            .iter()
            .map(|p| p.outputs()[0].layout().clone())
            .collect();
        let outputs = self
            .graph
            .results()
            .iter()
            .map(|r| r.outputs()[0].layout().clone())
            .collect();

        CompilationUnit::new(Target::Cpu, self.entry, source.finish())
            .with_static_hooks(
                format!("{}_static_init", self.entry),
                format!("{}_static_fini", self.entry),
            )
            .with_signature(inputs, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::generate;
    use tc_graph::ops;
    use tc_tensor::Shape;

    fn make_test_graph() -> Graph {
        let params: Vec<NodeRef> = (0..6)
            .map(|i| ops::named_parameter(&format!("arg{i}"), DType::F32, Shape::scalar()))
            .collect();
        let t0 = ops::add(&params[0], &params[1]).unwrap();
        let t1 = ops::dot(&t0, &params[2]).unwrap();
        let t2 = ops::multiply(&t0, &params[3]).unwrap();
        let t3 = ops::add(&t1, &params[4]).unwrap();
        let t4 = ops::add(&t2, &params[5]).unwrap();
        let r0 = ops::add(&t3, &t4).unwrap();
        Graph::new("test graph", params, vec![r0]).unwrap()
    }

    #[test]
    fn test_entry_and_bindings() {
        let graph = make_test_graph();
        let unit = generate(&graph, Target::Cpu).unwrap();
        let src = unit.source();

        assert_eq!(unit.entry(), "tc_test_graph");
        assert_eq!(unit.init_symbol(), Some("tc_test_graph_static_init"));
        assert!(src.contains("void tc_test_graph(void **inputs, void **outputs) {"));
        assert!(src.contains("float *arg0_0 = (float *)inputs[0];"));
        assert!(src.contains("float *arg5_0 = (float *)inputs[5];"));

        let result = &graph.results()[0];
        assert!(src.contains(&format!("float *{}_0 = (float *)outputs[0];", result.name())));
        assert_eq!(unit.inputs().len(), 6);
        assert_eq!(unit.outputs().len(), 1);
    }

    #[test]
    fn test_temporaries_are_freed_once() {
        let graph = make_test_graph();
        let unit = generate(&graph, Target::Cpu).unwrap();
        let src = unit.source();
        for node in graph.topological_order().filter(|n| n.is_op()) {
            let name = format!("{}_0", node.name());
            let is_result = graph.results()[0].is_same(&node);
            let mallocs = src.matches(&format!("{name} = (float *)malloc(")).count();
            let frees = src.matches(&format!("free({name});")).count();
            if is_result {
                assert_eq!((mallocs, frees), (0, 0), "{name}");
            } else {
                assert_eq!((mallocs, frees), (1, 1), "{name}");
                let alloc_at = src.find(&format!("{name} = (float *)malloc(")).unwrap();
                let free_at = src.find(&format!("free({name});")).unwrap();
                assert!(alloc_at < free_at);
            }
        }
        assert!(!src.contains("free(arg"));
    }

    #[test]
    fn test_constants_live_in_static_hooks() {
        let a = ops::parameter(DType::F64, [3]);
        let c = ops::constant(DType::F64, [3], vec![1.0, 2.0, 3.0]).unwrap();
        let s = ops::constant(DType::F64, [3], vec![0.5]).unwrap();
        let sum = ops::add(&ops::add(&a, &c).unwrap(), &s).unwrap();
        let graph = Graph::new("consts", vec![a], vec![sum]).unwrap();
        let src = generate(&graph, Target::Cpu).unwrap().source().to_string();

        let c_name = format!("{}_0", c.name());
        assert!(src.contains(&format!("static double *{c_name} = NULL;")));
        assert!(src.contains("1.0, 2.0, 3.0,"));
        assert!(src.contains(&format!("{}_0[i] = 0.5;", s.name())));
        assert!(src.contains(&format!("free({c_name});\n    {c_name} = NULL;")));

        let init_at = src.find("void tc_consts_static_init(void)").unwrap();
        let fini_at = src.find("void tc_consts_static_fini(void)").unwrap();
        let entry_at = src.find("void tc_consts(void **inputs").unwrap();
        assert!(init_at < fini_at && fini_at < entry_at);
        // Never freed by the entry function.
        assert_eq!(src[entry_at..].matches(&format!("free({c_name})")).count(), 0);
    }

    #[test]
    fn test_result_copies() {
        let a = ops::parameter(DType::I32, [4]);
        let neg = ops::negative(&a).unwrap();
        let results = vec![neg.clone(), neg.clone(), a.clone()];
        let graph = Graph::new("copies", vec![a.clone()], results).unwrap();
        let src = generate(&graph, Target::Cpu).unwrap().source().to_string();
        let neg_name = format!("{}_0", neg.name());
        let a_name = format!("{}_0", a.name());
        assert!(src.contains(&format!("int32_t *{neg_name} = (int32_t *)outputs[0];")));
        assert!(src.contains(&format!("memcpy(outputs[1], {neg_name}, 16);")));
        assert!(src.contains(&format!("memcpy(outputs[2], {a_name}, 16);")));
    }

    #[test]
    fn test_get_output_element_aliases_producer() {
        let (n, c, h) = (1, 2, 2);
        let params = vec![
            ops::parameter(DType::F32, [n, c]),
            ops::parameter(DType::F32, [2 * n, h]),
            ops::parameter(DType::F32, [4 * h, c]),
            ops::parameter(DType::F32, [4 * h, h]),
            ops::parameter(DType::F32, [4 * h]),
        ];
        let cell =
            ops::lstm_fused(&params[0], &params[1], &params[2], &params[3], &params[4]).unwrap();
        let hidden = ops::get_output_element(&cell, 0).unwrap();
        let relu = ops::relu(&hidden).unwrap();
        let state = ops::get_output_element(&cell, 1).unwrap();
        let graph = Graph::new("cell", params, vec![relu, state]).unwrap();
        let src = generate(&graph, Target::Cpu).unwrap().source().to_string();

        let h_buf = format!("{}_0", cell.name());
        let s_buf = format!("{}_1", cell.name());
        assert!(src.contains(&format!("float *{h_buf} = (float *)malloc(8);")));
        assert!(src.contains(&format!("{h_buf}[i] > 0.0f ? {h_buf}[i] : 0.0f")));
        assert!(src.contains(&format!("memcpy(outputs[1], {s_buf}, 16);")));
        assert!(!src.contains(&format!("{}_0", hidden.name())));
        assert_eq!(src.matches(&format!("free({h_buf});")).count(), 1);
        assert_eq!(src.matches(&format!("free({s_buf});")).count(), 1);
    }

    #[test]
    fn test_unusual_names_are_aliased() {
        let a = ops::named_parameter("my input", DType::F32, [2]);
        let b = ops::named_parameter("my_input", DType::F32, [2]);
        let sum = ops::add(&a, &b).unwrap();
        let graph = Graph::new("names", vec![a.clone(), b], vec![sum]).unwrap();
        let src = generate(&graph, Target::Cpu).unwrap().source().to_string();
        assert!(src.contains(&format!("float *my_input_0_v{} = (float *)inputs[0];", a.id())));
        assert!(src.contains("float *my_input_0 = (float *)inputs[1];"));
    }

    #[test]
    fn test_f16_rejected() {
        let a = ops::parameter(DType::F16, [2]);
        let graph = Graph::new("half", vec![a.clone()], vec![ops::negative(&a).unwrap()]).unwrap();
        let err = generate(&graph, Target::Cpu).unwrap_err();
        assert_eq!(
            err,
            CodegenError::UnsupportedElementType {
                op: "Parameter",
                dtype: DType::F16,
                target: Target::Cpu,
            }
        );
    }
}
