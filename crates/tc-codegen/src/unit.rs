use tc_tensor::TensorLayout;

use crate::gpu::LaunchSchedule;
use crate::target::Target;

/// The code generator's artifact: source text plus everything an execution
/// engine needs to bind and call it.
///
/// CPU units carry a C translation unit exporting
/// `void {entry}(void **inputs, void **outputs)` and, when present, the
/// static initializer and finalizer symbols. GPU units additionally carry
/// their launch schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    target: Target,
    entry: String,
    source: String,
    init_symbol: Option<String>,
    fini_symbol: Option<String>,
    inputs: Vec<TensorLayout>,
    outputs: Vec<TensorLayout>,
    schedule: Option<LaunchSchedule>,
}

impl CompilationUnit {
    pub fn new(target: Target, entry: impl Into<String>, source: impl Into<String>) -> Self {
        CompilationUnit {
            target,
            entry: entry.into(),
            source: source.into(),
            init_symbol: None,
            fini_symbol: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            schedule: None,
        }
    }

    /// Name the functions run once after loading and once before unloading.
    pub fn with_static_hooks(mut self, init: impl Into<String>, fini: impl Into<String>) -> Self {
        self.init_symbol = Some(init.into());
        self.fini_symbol = Some(fini.into());
        self
    }

    pub fn with_signature(mut self, inputs: Vec<TensorLayout>, outputs: Vec<TensorLayout>) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn with_schedule(mut self, schedule: LaunchSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn init_symbol(&self) -> Option<&str> {
        self.init_symbol.as_deref()
    }

    pub fn fini_symbol(&self) -> Option<&str> {
        self.fini_symbol.as_deref()
    }

    /// Layouts of `inputs[i]` in the entry point's calling convention.
    pub fn inputs(&self) -> &[TensorLayout] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorLayout] {
        &self.outputs
    }

    pub fn schedule(&self) -> Option<&LaunchSchedule> {
        self.schedule.as_ref()
    }

    /// A unit with no code to compile.
    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }
}
