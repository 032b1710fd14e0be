//! Processing strategies: one per backend.
//!
//! A strategy turns a [`Route`] into an external tool run. The capture
//! strategy hands the file to the indexer and is done; the analysis strategy
//! runs the analyzer inside a private workspace and archives what it wrote.

use chrono::Utc;
use opentelemetry::KeyValue;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{AnalysisConfig, BackendConfig, CaptureConfig};
use crate::engine::archive::{ArchiveOutcome, Archiver};
use crate::engine::router::Route;
use crate::engine::tool::{ToolCommand, ToolExit};
use crate::engine::workspace::Workspace;
use crate::error::Result;
use crate::model::{Backend, ExtractionMode, file_name_of};
use crate::telemetry::metrics;

pub const NO_LOCK_FLAG: &str = "--nolockpcap";
pub const ZEEK_LOCAL_SCRIPT: &str = "local";
pub const ZEEK_EXTRACTOR_SCRIPT: &str = "extractor.zeek";
pub const ZEEK_EXTRACTOR_SCRIPT_INTERESTING: &str = "extractor_override.interesting.zeek";
pub const ZEEK_EXTRACTOR_MODE_ENV_VAR: &str = "ZEEK_EXTRACTOR_MODE";

/// How processing of one item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The tool exited with status zero.
    Completed,
    /// The tool ran and exited non-zero.
    ToolFailed,
    /// The router decided this item is not for this backend.
    Skipped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::ToolFailed => "tool_failed",
            Outcome::Skipped => "skipped",
        }
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CaptureStrategy {
    executable: PathBuf,
    managed: bool,
}

impl CaptureStrategy {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            managed: config.managed,
        }
    }

    /// `<tool> -r <file> [--nolockpcap] (-t <tag>)*`
    pub fn command(&self, route: &Route) -> ToolCommand {
        let mut command = ToolCommand::new(&self.executable)
            .arg("-r")
            .arg(&route.path);
        if self.managed {
            command = command.arg(NO_LOCK_FLAG);
        }
        for tag in &route.tags {
            command = command.arg("-t").arg(tag);
        }
        command
    }

    pub async fn process(&self, route: &Route) -> Result<Outcome> {
        let exit = self.command(route).run().await?;
        report_exit(Backend::Capture, &self.executable, &route.path, &exit);
        Ok(if exit.success() {
            Outcome::Completed
        } else {
            Outcome::ToolFailed
        })
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AnalysisStrategy {
    executable: PathBuf,
    scratch_dir: PathBuf,
    archiver: Archiver,
}

impl AnalysisStrategy {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            scratch_dir: config.scratch_dir.clone(),
            archiver: Archiver::new(&config.output_dir),
        }
    }

    /// `<tool> -r <file> local [extractor.zeek [extractor_override.interesting.zeek]]`
    ///
    /// The extraction mode goes into the child's own environment. The
    /// interesting override is a variant of mapped mode as far as the
    /// extractor script is concerned.
    pub fn command(&self, route: &Route, workdir: &Path) -> ToolCommand {
        let mut command = ToolCommand::new(&self.executable)
            .arg("-r")
            .arg(&route.path)
            .arg(ZEEK_LOCAL_SCRIPT)
            .current_dir(workdir);

        let env_mode = match route.extract_mode {
            ExtractionMode::None => ExtractionMode::None,
            ExtractionMode::Mapped => {
                command = command.arg(ZEEK_EXTRACTOR_SCRIPT);
                ExtractionMode::Mapped
            }
            ExtractionMode::Interesting => {
                command = command
                    .arg(ZEEK_EXTRACTOR_SCRIPT)
                    .arg(ZEEK_EXTRACTOR_SCRIPT_INTERESTING);
                ExtractionMode::Mapped
            }
        };

        command.env(ZEEK_EXTRACTOR_MODE_ENV_VAR, env_mode.as_str())
    }

    pub async fn process(&self, route: &Route) -> Result<Outcome> {
        if !route.process {
            debug!(path = %route.path.display(), "not selected for analysis");
            metrics::items_dropped().add(1, &[KeyValue::new("reason", "not_selected")]);
            return Ok(Outcome::Skipped);
        }

        let started_micros = Utc::now().timestamp_micros();
        let workspace = Workspace::create(&self.scratch_dir).await?;
        let result = self.run_in(&workspace, route, started_micros).await;
        if let Err(e) = workspace.cleanup().await {
            warn!(error = %e, "failed to remove workspace");
        }
        result
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        route: &Route,
        started_micros: i64,
    ) -> Result<Outcome> {
        let exit = self.command(route, workspace.path()).run().await?;
        report_exit(Backend::Analysis, &self.executable, &route.path, &exit);

        if let Err(e) = workspace.remove_state_dir().await {
            warn!(workspace = %workspace.id, error = %e, "failed to remove tool state directory");
        }

        // Logs from a failed run are still archived.
        let archived = self
            .archiver
            .archive(workspace.path(), &route.path, &route.tags, started_micros)
            .await;
        let result = match archived {
            Ok(ArchiveOutcome::Archived(dest)) => {
                debug!(archive = %dest.display(), "archive relocated");
                "archived"
            }
            Ok(ArchiveOutcome::NoOutput) => {
                debug!(
                    tool = %self.executable.display(),
                    file = %file_name_of(&route.path),
                    "generated no log files"
                );
                "empty"
            }
            Ok(ArchiveOutcome::DestinationUnavailable) => "unavailable",
            Err(e) => {
                warn!(file = %file_name_of(&route.path), error = %e, "failed to archive logs");
                "error"
            }
        };
        metrics::archives().add(1, &[KeyValue::new("result", result)]);

        Ok(if exit.success() {
            Outcome::Completed
        } else {
            Outcome::ToolFailed
        })
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// The active backend's strategy.
#[derive(Debug, Clone)]
pub enum Strategy {
    Capture(CaptureStrategy),
    Analysis(AnalysisStrategy),
}

impl Strategy {
    pub fn from_config(config: &BackendConfig) -> Self {
        match config {
            BackendConfig::Capture(capture) => Strategy::Capture(CaptureStrategy::new(capture)),
            BackendConfig::Analysis(analysis) => {
                Strategy::Analysis(AnalysisStrategy::new(analysis))
            }
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Strategy::Capture(_) => Backend::Capture,
            Strategy::Analysis(_) => Backend::Analysis,
        }
    }

    pub async fn process(&self, route: &Route) -> Result<Outcome> {
        match self {
            Strategy::Capture(strategy) => strategy.process(route).await,
            Strategy::Analysis(strategy) => strategy.process(route).await,
        }
    }
}

fn report_exit(backend: Backend, tool: &Path, path: &Path, exit: &ToolExit) {
    let backend_label = KeyValue::new("backend", backend.to_string());
    metrics::tool_duration_ms().record(
        exit.duration.as_secs_f64() * 1000.0,
        std::slice::from_ref(&backend_label),
    );

    let result = if exit.success() {
        debug!(file = %file_name_of(path), duration_ms = exit.duration.as_millis() as u64, "tool succeeded");
        "ok"
    } else {
        debug!(
            tool = %tool.display(),
            file = %file_name_of(path),
            code = ?exit.code,
            output = %exit.output_tail(),
            "tool failed"
        );
        "failed"
    };
    metrics::tool_invocations().add(1, &[backend_label, KeyValue::new("result", result)]);
}
