//! Execution request handed to the runner.

use crate::limits::ExecLimits;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A vetted invocation of the wrapped executable.
///
/// Built once from pipeline output and not mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    /// Executable to run; looked up on `PATH` when not absolute.
    pub bin: PathBuf,

    /// Arguments (not including the binary itself).
    pub argv: Vec<String>,

    /// Working directory. Empty means the current directory.
    ///
    /// Created (with parents) before spawning.
    pub cwd: PathBuf,

    /// Variables set on top of the inherited environment.
    pub env: HashMap<String, String>,

    /// Deadline and capture cap.
    pub limits: ExecLimits,

    /// Captured lines containing any of these are dropped from stdout.
    pub stdout_exclude: Vec<String>,

    /// Captured lines containing any of these are dropped from stderr.
    pub stderr_exclude: Vec<String>,
}

impl ExecRequest {
    /// Create a new request with minimal arguments.
    pub fn new(bin: impl Into<PathBuf>, argv: Vec<String>) -> Self {
        Self {
            bin: bin.into(),
            argv,
            ..Self::default()
        }
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Set environment overrides.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Set the local deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = Some(timeout);
        self
    }

    /// Set the per-stream capture cap (zero means the default).
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.limits.max_output_bytes = max;
        self
    }

    /// Set line filters for both streams.
    pub fn with_line_filters(mut self, stdout: Vec<String>, stderr: Vec<String>) -> Self {
        self.stdout_exclude = stdout;
        self.stderr_exclude = stderr;
        self
    }
}
