use std::ffi::c_void;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use libloading::Library;
use tc_codegen::CompilationUnit;

use crate::error::EngineError;
use crate::toolchain::Toolchain;

type Result<T> = std::result::Result<T, EngineError>;

type EntryFn = unsafe extern "C" fn(*mut *mut c_void, *mut *mut c_void);
type HookFn = unsafe extern "C" fn();

enum State {
    Empty,
    Bound {
        unit: CompilationUnit,
        path: PathBuf,
    },
    Finalized {
        unit: CompilationUnit,
        library: Library,
        path: PathBuf,
    },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Empty => "empty",
            State::Bound { .. } => "bound",
            State::Finalized { .. } => "finalized",
        }
    }
}

/// Compiles one CPU unit to native code, loads it and hands out its entry
/// points.
///
/// An engine goes through `Empty -> Bound -> Finalized` exactly once. The
/// unit's static initializer runs when the engine is finalized and its
/// finalizer when the engine is dropped.
pub struct ExecutionEngine {
    toolchain: Arc<Toolchain>,
    state: State,
    last_error: Option<String>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("state", &self.state.name())
            .field("entry", &self.unit().map(|u| u.entry()))
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl ExecutionEngine {
    pub fn new(toolchain: Arc<Toolchain>) -> Self {
        ExecutionEngine {
            toolchain,
            state: State::Empty,
            last_error: None,
        }
    }

    /// Bind `unit`, returning false on failure. The reason is kept in
    /// [`last_error`](Self::last_error).
    pub fn add_unit(&mut self, unit: CompilationUnit) -> bool {
        match self.bind(unit) {
            Ok(()) => true,
            Err(err) => {
                self.last_error = Some(err.to_string());
                false
            }
        }
    }

    /// Compile and link `unit` into this engine.
    ///
    /// Only one unit can be bound; a later one is rejected and the first
    /// stays in place.
    pub fn bind(&mut self, unit: CompilationUnit) -> Result<()> {
        if let Some(bound) = self.unit() {
            log::warn!(
                "rejecting unit '{}': engine already holds '{}'",
                unit.entry(),
                bound.entry()
            );
            return Err(EngineError::AlreadyBound);
        }
        if unit.is_empty() {
            return Err(EngineError::EmptyUnit);
        }
        let path = self.toolchain.compile(&unit)?;
        log::debug!("bound '{}' from {}", unit.entry(), path.display());
        self.state = State::Bound { unit, path };
        Ok(())
    }

    /// Load the bound library and run its static initializer.
    pub fn finalize(&mut self) -> Result<()> {
        let (unit, path) = match &self.state {
            State::Finalized { .. } => return Ok(()),
            State::Empty => {
                let reason = self
                    .last_error
                    .as_deref()
                    .unwrap_or("Could not create an execution engine");
                return Err(EngineError::Fatal(format!("Error in finalize: {reason}")));
            }
            State::Bound { unit, path } => (unit, path),
        };

        let library = match unsafe { Library::new(path) } {
            Ok(library) => library,
            Err(err) => {
                let err = EngineError::Load(err.to_string());
                self.last_error = Some(err.to_string());
                return Err(err);
            }
        };
        if let Some(init) = unit.init_symbol() {
            let hook = match lookup::<HookFn>(&library, init) {
                Ok(hook) => hook,
                Err(err) => {
                    self.last_error = Some(err.to_string());
                    return Err(err);
                }
            };
            unsafe { hook() };
        }
        log::info!("finalized '{}'", unit.entry());

        let (unit, path) = (unit.clone(), path.clone());
        self.state = State::Finalized {
            unit,
            library,
            path,
        };
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized { .. })
    }

    /// Resolve an exported function of the loaded unit.
    pub fn get_entry_point(&self, symbol: &str) -> Result<EntryPoint<'_>> {
        match &self.state {
            State::Finalized { library, .. } => {
                let func = lookup::<EntryFn>(library, symbol)?;
                Ok(EntryPoint {
                    func,
                    _library: PhantomData,
                })
            }
            _ => Err(EngineError::NotFinalized),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn unit(&self) -> Option<&CompilationUnit> {
        match &self.state {
            State::Empty => None,
            State::Bound { unit, .. } | State::Finalized { unit, .. } => Some(unit),
        }
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Empty => {}
            State::Bound { path, .. } => self.toolchain.release(&path),
            State::Finalized {
                unit,
                library,
                path,
            } => {
                if let Some(fini) = unit.fini_symbol() {
                    match lookup::<HookFn>(&library, fini) {
                        Ok(hook) => {
                            unsafe { hook() };
                            log::debug!("ran static finalizer of '{}'", unit.entry());
                        }
                        Err(err) => log::warn!("{err}"),
                    }
                }
                drop(library);
                self.toolchain.release(&path);
            }
        }
    }
}

fn lookup<T: Copy>(library: &Library, symbol: &str) -> Result<T> {
    unsafe { library.get::<T>(symbol.as_bytes()) }
        .map(|s| *s)
        .map_err(|_| EngineError::SymbolNotFound(symbol.to_string()))
}

/// A compiled `void entry(void **inputs, void **outputs)` function, valid
/// while its engine is alive.
#[derive(Clone, Copy)]
pub struct EntryPoint<'a> {
    func: EntryFn,
    _library: PhantomData<&'a Library>,
}

impl std::fmt::Debug for EntryPoint<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntryPoint({:p})", self.func as *const c_void)
    }
}

impl EntryPoint<'_> {
    /// Call the compiled function.
    ///
    /// # Safety
    ///
    /// `inputs` and `outputs` must hold one pointer per parameter and result
    /// of the compiled graph, in declaration order, each pointing to a dense
    /// buffer of the declared element type and size. Output buffers must
    /// not overlap each other or any input.
    pub unsafe fn invoke(&self, inputs: &[*mut c_void], outputs: &[*mut c_void]) {
        (self.func)(inputs.as_ptr() as *mut *mut c_void, outputs.as_ptr() as *mut *mut c_void)
    }
}
