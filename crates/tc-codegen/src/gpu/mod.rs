//! Lowering to a GPU launch schedule.
//!
//! Element-wise work and copies become CUDA C kernels; contractions and the
//! LSTM cell are delegated to library routines. The schedule is data: a
//! device runtime walks the steps in order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tc_graph::{
    buffer_owner, BinaryOp, Graph, GraphError, LstmDims, NodeId, NodeRef, OpKind, UnaryOp,
};
use tc_tensor::DType;

use crate::backend::Emitter;
use crate::error::Result;
use crate::target::Target;
use crate::unit::CompilationUnit;
use crate::writer::{c_literal, CodeWriter};

pub const BLOCK_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleStep {
    /// Reserve `bytes` of device memory for `buffer`.
    Alloc { buffer: String, bytes: usize },
    /// Run a generated kernel over `grid` blocks of `block` threads.
    Launch {
        kernel: String,
        grid: usize,
        block: usize,
        args: Vec<String>,
    },
    /// Call a vendor library routine.
    Library { routine: String, args: Vec<String> },
    /// `buffer` names the same memory as `target`.
    Alias { buffer: String, target: String },
    /// Upload a host constant into `buffer`.
    Upload { buffer: String, values: Vec<f64> },
    Free { buffer: String },
}

impl fmt::Display for ScheduleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStep::Alloc { buffer, bytes } => {
                write!(f, "alloc {} ({} bytes)", buffer, bytes)
            }
            ScheduleStep::Launch {
                kernel,
                grid,
                block,
                args,
            } => write!(
                f,
                "launch {}<<<{}, {}>>>({})",
                kernel,
                grid,
                block,
                args.join(", ")
            ),
            ScheduleStep::Library { routine, args } => {
                write!(f, "call {}({})", routine, args.join(", "))
            }
            ScheduleStep::Alias { buffer, target } => write!(f, "alias {} = {}", buffer, target),
            ScheduleStep::Upload { buffer, values } => {
                write!(f, "upload {} ({} values)", buffer, values.len())
            }
            ScheduleStep::Free { buffer } => write!(f, "free {}", buffer),
        }
    }
}

/// Kernel source plus the ordered steps that drive it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaunchSchedule {
    pub kernels: String,
    pub steps: Vec<ScheduleStep>,
    /// Buffers bound to the entry's inputs, in parameter order.
    pub inputs: Vec<String>,
    /// Buffers read back as results, in result order.
    pub outputs: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GpuEmitter;

impl Emitter for GpuEmitter {
    fn target(&self) -> Target {
        Target::Gpu
    }

    fn emit(&self, graph: &Graph, entry: &str) -> Result<CompilationUnit> {
        let liveness = graph.liveness();
        // Buffers read back as results, including those reached through an alias.
        let pinned: HashSet<(NodeId, usize)> = graph
            .results()
            .iter()
            .map(|result| match result.op() {
                OpKind::GetOutputElement { index } => (buffer_owner(result).id(), *index),
                _ => (result.id(), 0),
            })
            .collect();

        let mut lowering = GpuLowering::default();
        for (position, node) in liveness.order().iter().enumerate() {
            lowering.lower(node)?;

            for dead in liveness.freed_after(position) {
                for index in 0..dead.outputs().len() {
                    if pinned.contains(&(dead.id(), index)) {
                        continue;
                    }
                    if let Some(buffer) = lowering.buffers.get(&(dead.id(), index)) {
                        lowering.steps.push(ScheduleStep::Free {
                            buffer: buffer.clone(),
                        });
                    }
                }
            }
        }

        let mut source = CodeWriter::new();
        source.line(format!("/* {} */", entry));
        source.line("#include <cuda_fp16.h>");
        source.line("#include <stdint.h>");
        for kernel in lowering.kernels.values() {
            source.blank();
            source.line(kernel.trim_end());
        }

        let schedule = LaunchSchedule {
            kernels: source.as_str().to_string(),
            inputs: graph
                .parameters()
                .iter()
                .map(|p| p.outputs()[0].name().to_string())
                .collect(),
            outputs: graph
                .results()
                .iter()
                .map(|r| buffer_of(&lowering.buffers, r))
                .collect(),
            steps: lowering.steps,
        };
        let inputs = graph
            .parameters()
            .iter()
            .map(|p| p.outputs()[0].layout().clone())
            .collect();
        let outputs = graph
            .results()
            .iter()
            .map(|r| r.outputs()[0].layout().clone())
            .collect();

        Ok(CompilationUnit::new(Target::Gpu, entry, source.finish())
            .with_signature(inputs, outputs)
            .with_schedule(schedule))
    }
}

#[derive(Default)]
struct GpuLowering {
    kernels: BTreeMap<String, String>,
    steps: Vec<ScheduleStep>,
    buffers: HashMap<(NodeId, usize), String>,
}

impl GpuLowering {
    fn lower(&mut self, node: &NodeRef) -> Result<()> {
        let args: Vec<String> = node
            .inputs()
            .iter()
            .map(|i| buffer_of(&self.buffers, i))
            .collect();

        match node.op() {
            OpKind::Parameter { .. } => {
                let name = node.outputs()[0].name().to_string();
                self.buffers.insert((node.id(), 0), name);
                return Ok(());
            }
            OpKind::GetOutputElement { index } => {
                let producer = &node.inputs()[0];
                let target = self
                    .buffers
                    .get(&(producer.id(), *index))
                    .cloned()
                    .unwrap_or_else(|| args[0].clone());
                self.steps.push(ScheduleStep::Alias {
                    buffer: node.outputs()[0].name().to_string(),
                    target: target.clone(),
                });
                self.buffers.insert((node.id(), 0), target);
                return Ok(());
            }
            _ => {}
        }

        let outputs: Vec<String> = node
            .outputs()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        for (index, desc) in node.outputs().iter().enumerate() {
            self.steps.push(ScheduleStep::Alloc {
                buffer: outputs[index].clone(),
                bytes: desc.layout().size(),
            });
            self.buffers.insert((node.id(), index), outputs[index].clone());
        }

        let out_ty = node.outputs()[0].tensor_type();
        let dtype = out_ty.dtype();
        let count = out_ty.numel();
        let grid = count.div_ceil(BLOCK_SIZE).max(1);

        match node.op() {
            OpKind::Constant { values, .. } => {
                self.steps.push(ScheduleStep::Upload {
                    buffer: outputs[0].clone(),
                    values: values.clone(),
                });
            }
            OpKind::Unary(op) => {
                let kernel = format!("tc_{}_{}", op.name().to_ascii_lowercase(), dtype);
                self.add_kernel(&kernel, dtype, 1, &unary_expr(*op, dtype));
                let launch_args = vec![args[0].clone(), outputs[0].clone(), count.to_string()];
                self.steps.push(launch(kernel, grid, launch_args));
            }
            OpKind::Binary(op) => {
                let kernel = format!("tc_{}_{}", op.name().to_ascii_lowercase(), dtype);
                self.add_kernel(&kernel, dtype, 2, binary_expr(*op));
                let launch_args = vec![
                    args[0].clone(),
                    args[1].clone(),
                    outputs[0].clone(),
                    count.to_string(),
                ];
                self.steps.push(launch(kernel, grid, launch_args));
            }
            OpKind::Reshape { axis_order, .. } => {
                if axis_order.iter().enumerate().all(|(i, &a)| i == a) {
                    let kernel = format!("tc_copy_{}", dtype);
                    self.add_kernel(&kernel, dtype, 1, "a");
                    let launch_args = vec![args[0].clone(), outputs[0].clone(), count.to_string()];
                    self.steps.push(launch(kernel, grid, launch_args));
                } else {
                    let order: Vec<String> = axis_order.iter().map(|a| a.to_string()).collect();
                    self.steps.push(ScheduleStep::Library {
                        routine: "permute".to_string(),
                        args: vec![
                            args[0].clone(),
                            outputs[0].clone(),
                            format!("[{}]", order.join(",")),
                        ],
                    });
                }
            }
            OpKind::Dot => {
                self.steps.push(ScheduleStep::Library {
                    routine: "gemm".to_string(),
                    args: vec![args[0].clone(), args[1].clone(), outputs[0].clone()],
                });
            }
            OpKind::Lstm { .. } => {
                let dims = LstmDims::of(node).map_err(GraphError::from)?;
                let mut call_args = args;
                call_args.extend(outputs.iter().cloned());
                call_args.push(format!(
                    "n={},c={},h={}",
                    dims.batch_size, dims.layer_feature_size, dims.iter_feature_size
                ));
                let routine = if dims.fused {
                    "lstm_cell_fused"
                } else {
                    "lstm_cell"
                };
                self.steps.push(ScheduleStep::Library {
                    routine: routine.to_string(),
                    args: call_args,
                });
            }
            OpKind::Parameter { .. } | OpKind::GetOutputElement { .. } => {}
        }
        Ok(())
    }

    fn add_kernel(&mut self, name: &str, dtype: DType, operands: usize, expr: &str) {
        self.kernels
            .entry(name.to_string())
            .or_insert_with(|| elementwise_kernel(name, dtype, operands, expr));
    }
}

fn buffer_of(buffers: &HashMap<(NodeId, usize), String>, node: &NodeRef) -> String {
    buffers
        .get(&(node.id(), 0))
        .cloned()
        .unwrap_or_else(|| node.outputs()[0].name().to_string())
}

fn launch(kernel: String, grid: usize, args: Vec<String>) -> ScheduleStep {
    ScheduleStep::Launch {
        kernel,
        grid,
        block: BLOCK_SIZE,
        args,
    }
}

/// CUDA spelling of an element type.
fn cuda_type(dtype: DType) -> &'static str {
    match dtype {
        DType::F16 => "__half",
        other => other.c_type_name(),
    }
}

/// Arithmetic type kernels compute in; half values are widened.
fn compute_type(dtype: DType) -> &'static str {
    match dtype {
        DType::F16 => "float",
        other => other.c_type_name(),
    }
}

fn unary_expr(op: UnaryOp, dtype: DType) -> String {
    let (exp, tanh) = if dtype == DType::F64 {
        ("exp", "tanh")
    } else {
        ("expf", "tanhf")
    };
    let zero = c_literal(dtype, 0.0);
    match op {
        UnaryOp::Negative => "-a".to_string(),
        UnaryOp::Exp => format!("{exp}(a)"),
        UnaryOp::Tanh => format!("{tanh}(a)"),
        UnaryOp::Sigmoid => format!("1 / (1 + {exp}(-a))"),
        UnaryOp::Relu => format!("a > {zero} ? a : {zero}"),
    }
}

fn binary_expr(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "a + b",
        BinaryOp::Subtract => "a - b",
        BinaryOp::Multiply => "a * b",
        BinaryOp::Divide => "a / b",
        BinaryOp::Maximum => "a > b ? a : b",
    }
}

/// One thread per element: `out[i] = expr(a[i], b[i])`.
fn elementwise_kernel(name: &str, dtype: DType, operands: usize, expr: &str) -> String {
    let ty = cuda_type(dtype);
    let ct = compute_type(dtype);
    let mut params: Vec<String> = ["a", "b"][..operands]
        .iter()
        .map(|p| format!("const {ty} *{p}_in"))
        .collect();
    params.push(format!("{ty} *out"));
    params.push("size_t n".to_string());

    let mut w = CodeWriter::new();
    w.open(format!("extern \"C\" __global__ void {name}({})", params.join(", ")));
    w.line("size_t i = (size_t)blockIdx.x * blockDim.x + threadIdx.x;");
    w.line("if (i >= n) return;");
    for p in &["a", "b"][..operands] {
        w.line(format!("{ct} {p} = ({ct}){p}_in[i];"));
    }
    w.line(format!("out[i] = ({ty})({expr});"));
    w.close();
    w.finish()
}
