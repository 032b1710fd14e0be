//! External tool invocation.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::Result;

/// Bytes of tool output kept for failure logs.
const OUTPUT_TAIL_BYTES: usize = 2048;

/// A fully built command line for one tool run.
///
/// Everything the child needs, including its environment and working
/// directory, lives here so concurrent runs never share process state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

/// How a tool run ended.
#[derive(Debug, Clone)]
pub struct ToolExit {
    /// Exit code, `None` if the child was killed by a signal.
    pub code: Option<i32>,
    pub duration: Duration,
    output: String,
}

impl ToolExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last few kilobytes of combined stdout/stderr.
    pub fn output_tail(&self) -> &str {
        &self.output
    }
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Arguments as lossy UTF-8, for logs and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Run to completion. Only a failure to spawn is an error; a non-zero
    /// exit is reported through [`ToolExit`].
    pub async fn run(&self) -> Result<ToolExit> {
        debug!(
            program = %self.program.display(),
            args = ?self.args_lossy(),
            cwd = ?self.cwd,
            "running tool"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        if let Some(ref dir) = self.cwd {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let output = command.output().await?;
        let duration = start.elapsed();

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let tail_start = combined.len().saturating_sub(OUTPUT_TAIL_BYTES);
        let tail = String::from_utf8_lossy(&combined[tail_start..]).into_owned();

        trace!(
            program = %self.program.display(),
            code = ?output.status.code(),
            output = %tail,
            "tool exited"
        );

        Ok(ToolExit {
            code: output.status.code(),
            duration,
            output: tail,
        })
    }
}
