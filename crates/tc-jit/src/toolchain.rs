use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use tc_codegen::{CompilationUnit, Target};
use tempfile::TempDir;

use crate::config::ToolchainConfig;
use crate::error::ToolchainError;

type Result<T> = std::result::Result<T, ToolchainError>;

static SHARED: Mutex<Weak<Toolchain>> = Mutex::new(Weak::new());

enum WorkDir {
    Temp(TempDir),
    Kept(PathBuf),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            WorkDir::Temp(dir) => dir.path(),
            WorkDir::Kept(path) => path,
        }
    }
}

/// The native compilation context shared by execution engines.
///
/// Each compiled unit gets its own directory under the toolchain's working
/// directory, so engines on different threads can compile at the same time.
/// The working directory is removed when the last handle is dropped unless
/// `keep_artifacts` is set.
pub struct Toolchain {
    config: ToolchainConfig,
    workdir: WorkDir,
    next_unit: AtomicU64,
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain")
            .field("config", &self.config)
            .field("workdir", &self.workdir.path())
            .finish()
    }
}

impl Toolchain {
    pub fn new(config: ToolchainConfig) -> Result<Arc<Self>> {
        let workdir = if config.keep_artifacts {
            static KEPT: AtomicU64 = AtomicU64::new(0);
            let path = std::env::temp_dir().join(format!(
                "tc-jit-{}-{}",
                std::process::id(),
                KEPT.fetch_add(1, Ordering::Relaxed)
            ));
            std::fs::create_dir_all(&path)?;
            log::info!("keeping JIT artifacts in {}", path.display());
            WorkDir::Kept(path)
        } else {
            WorkDir::Temp(tempfile::Builder::new().prefix("tc-jit-").tempdir()?)
        };
        Ok(Arc::new(Toolchain {
            config,
            workdir,
            next_unit: AtomicU64::new(0),
        }))
    }

    /// The process-wide toolchain configured from the environment.
    ///
    /// Created on first use and recreated after every handle has been dropped.
    pub fn shared() -> Result<Arc<Self>> {
        let mut slot = SHARED.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = slot.upgrade() {
            return Ok(existing);
        }
        let toolchain = Toolchain::new(ToolchainConfig::from_env())?;
        *slot = Arc::downgrade(&toolchain);
        Ok(toolchain)
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Compile and link a CPU unit into a shared library, returning its path.
    pub fn compile(&self, unit: &CompilationUnit) -> Result<PathBuf> {
        if unit.target() != Target::Cpu {
            return Err(ToolchainError::UnsupportedTarget(unit.target()));
        }

        let id = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let dir = self.workdir().join(format!("unit{id}"));
        std::fs::create_dir_all(&dir)?;
        let src = dir.join(format!("{}.c", unit.entry()));
        let out = dir.join(format!("lib{}{}", unit.entry(), lib_ext()));
        std::fs::write(&src, unit.source())?;

        let mut cmd = Command::new(&self.config.compiler);
        if cfg!(target_os = "macos") {
            cmd.arg("-dynamiclib");
        } else {
            cmd.arg("-shared").arg("-fPIC");
        }
        cmd.arg(format!("-O{}", self.config.opt_level));
        cmd.args(&self.config.extra_flags);
        cmd.arg("-o").arg(&out).arg(&src);
        if !cfg!(target_os = "windows") {
            cmd.arg("-lm");
        }

        log::debug!("compiling '{}': {:?}", unit.entry(), cmd);
        let start = Instant::now();
        let output = match cmd.output() {
            Ok(output) => output,
            Err(source) => {
                self.release(&out);
                return Err(ToolchainError::Spawn {
                    compiler: self.config.compiler.clone(),
                    source,
                });
            }
        };
        if !output.status.success() {
            self.release(&out);
            return Err(ToolchainError::CompileFailed {
                compiler: self.config.compiler.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        log::info!(
            "compiled '{}' in {:.1} ms",
            unit.entry(),
            start.elapsed().as_secs_f64() * 1e3
        );
        Ok(out)
    }

    /// Delete the scratch directory of a library returned by
    /// [`compile`](Self::compile). Kept when `keep_artifacts` is set.
    pub fn release(&self, library: &Path) {
        if self.config.keep_artifacts {
            return;
        }
        let Some(dir) = library.parent() else {
            return;
        };
        if dir == self.workdir() || !dir.starts_with(self.workdir()) {
            return;
        }
        match std::fs::remove_dir_all(dir) {
            Ok(()) => log::debug!("removed {}", dir.display()),
            Err(err) => log::warn!("failed to remove {}: {}", dir.display(), err),
        }
    }
}

pub(crate) fn lib_ext() -> &'static str {
    if cfg!(target_os = "macos") {
        ".dylib"
    } else if cfg!(target_os = "windows") {
        ".dll"
    } else {
        ".so"
    }
}
