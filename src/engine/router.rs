//! Tag router: decides whether and how a capture file is processed.
//!
//! Pure logic over a work item and the immutable run settings. Control tags
//! (`AUTOZEEK`, `AUTOCARVE*`) are consumed here and never reach a tool.

use std::path::PathBuf;
use tracing::warn;

use crate::config::{BackendConfig, DispatcherConfig};
use crate::model::{
    AUTOCARVE_TAG_PREFIX, AUTOZEEK_TAG, Backend, ExtractionMode, WorkItem, is_control_tag,
};

/// Processing parameters derived for one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: PathBuf,
    /// Whether the selected backend should run at all.
    pub process: bool,
    /// Effective extraction mode for this invocation only.
    pub extract_mode: ExtractionMode,
    /// Tags forwarded to the external tool.
    pub tags: Vec<String>,
}

/// Router settings, captured once from the dispatcher configuration.
#[derive(Debug, Clone)]
pub struct Router {
    backend: Backend,
    autotag: bool,
    autoanalyze: bool,
    default_mode: ExtractionMode,
}

impl Router {
    pub fn new(backend: Backend, autotag: bool) -> Self {
        Self {
            backend,
            autotag,
            autoanalyze: false,
            default_mode: ExtractionMode::None,
        }
    }

    pub fn autoanalyze(mut self, enabled: bool) -> Self {
        self.autoanalyze = enabled;
        self
    }

    pub fn default_mode(mut self, mode: ExtractionMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn from_config(config: &DispatcherConfig) -> Self {
        match &config.backend {
            BackendConfig::Capture(_) => Router::new(Backend::Capture, config.autotag),
            BackendConfig::Analysis(analysis) => Router::new(Backend::Analysis, config.autotag)
                .autoanalyze(analysis.autoanalyze)
                .default_mode(analysis.extract_mode),
        }
    }

    pub fn route(&self, item: WorkItem) -> Route {
        match self.backend {
            Backend::Capture => Route {
                tags: self.outgoing_tags(&item.tags),
                path: item.path,
                process: true,
                extract_mode: ExtractionMode::None,
            },
            Backend::Analysis => {
                let process =
                    self.autoanalyze || item.tags.iter().any(|tag| tag == AUTOZEEK_TAG);

                // Every valid AUTOCARVE tag overrides the one before it, so the
                // last one in the sequence wins.
                let mut extract_mode = self.default_mode;
                for tag in &item.tags {
                    let Some(suffix) = tag.strip_prefix(AUTOCARVE_TAG_PREFIX) else {
                        continue;
                    };
                    match ExtractionMode::from_tag_suffix(suffix) {
                        Some(mode) => extract_mode = mode,
                        None => warn!(tag = %tag, "ignoring carve tag with unknown mode"),
                    }
                }

                Route {
                    tags: self.outgoing_tags(&item.tags),
                    path: item.path,
                    process,
                    extract_mode,
                }
            }
        }
    }

    fn outgoing_tags(&self, tags: &[String]) -> Vec<String> {
        if !self.autotag {
            return Vec::new();
        }
        tags.iter()
            .filter(|tag| !is_control_tag(tag))
            .cloned()
            .collect()
    }
}
