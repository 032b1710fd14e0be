//! Typed configuration.
//!
//! [`Config`] is loaded once from the environment at startup and fails fast on
//! malformed values. [`DispatcherConfig`] is the immutable per-run settings
//! object assembled from the command line and handed to every component.

use crate::error::{Error, Result};
use crate::model::{Backend, ExtractionMode};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOPIC_ADDR: &str = "127.0.0.1";
pub const DEFAULT_TOPIC_PORT: u16 = 30441;

pub const MOLOCH_CAPTURE_PATH: &str = "/data/moloch/bin/moloch-capture";
pub const ZEEK_PATH: &str = "/opt/zeek/bin/zeek";

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub topic_addr: String,
    pub topic_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let topic_port = match lookup("PCAP_TOPIC_PORT") {
            Some(port) => port.trim().parse().map_err(|_| {
                Error::Config(format!("PCAP_TOPIC_PORT is not a valid port: {port}"))
            })?,
            None => DEFAULT_TOPIC_PORT,
        };

        Ok(Self {
            otel_endpoint: lookup("OTEL_ENDPOINT").filter(|s| !s.is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            topic_addr: lookup("PCAP_TOPIC_ADDR").unwrap_or_else(|| DEFAULT_TOPIC_ADDR.to_string()),
            topic_port,
        })
    }

    /// ZeroMQ endpoint the subscriber connects to.
    pub fn topic_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.topic_addr, self.topic_port)
    }
}

/// Normalize a `host:port` or full `tcp://host:port` endpoint.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("tcp://{endpoint}")
    }
}

// ---------------------------------------------------------------------------
// Dispatcher settings
// ---------------------------------------------------------------------------

/// Settings for the capture-indexing backend.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub executable: PathBuf,
    /// The tool manages the capture files itself, so they are not locked.
    pub managed: bool,
}

/// Settings for the traffic-analysis backend.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub executable: PathBuf,
    /// Analyze every file, not only those tagged `AUTOZEEK`.
    pub autoanalyze: bool,
    pub extract_mode: ExtractionMode,
    /// Destination for produced log archives.
    pub output_dir: PathBuf,
    /// Parent directory for per-invocation workspaces.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    Capture(CaptureConfig),
    Analysis(AnalysisConfig),
}

impl BackendConfig {
    pub fn backend(&self) -> Backend {
        match self {
            BackendConfig::Capture(_) => Backend::Capture,
            BackendConfig::Analysis(_) => Backend::Analysis,
        }
    }
}

/// Immutable configuration for one dispatcher run.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub backend: BackendConfig,
    /// Number of parallel workers, at least one.
    pub workers: usize,
    /// Forward non-control tags to the external tool.
    pub autotag: bool,
    /// Upper bound for a single transport receive.
    pub recv_timeout: Duration,
    /// Hard bound on waiting for in-flight work at shutdown.
    pub drain_timeout: Option<Duration>,
}

impl DispatcherConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            workers: 1,
            autotag: false,
            recv_timeout: Duration::from_millis(1500),
            drain_timeout: None,
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    pub fn autotag(mut self, enabled: bool) -> Self {
        self.autotag = enabled;
        self
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

/// Resolve a relative executable against the current working directory.
///
/// Tools run with their own working directory, which would otherwise change
/// how a relative path is looked up. Bare names are left for `PATH` lookup.
pub fn resolve_executable(path: PathBuf) -> Result<PathBuf> {
    if path.is_relative() && path.components().count() > 1 {
        Ok(std::env::current_dir()?.join(path))
    } else {
        Ok(path)
    }
}
