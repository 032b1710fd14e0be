//! Core data model.
//!
//! A work item is one capture file waiting to be processed, plus the tags the
//! capture watcher attached to it. Some tags are control tags that the router
//! consumes instead of forwarding to the external tool.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Result;

/// Tag that forces traffic analysis even when auto-analysis is off.
pub const AUTOZEEK_TAG: &str = "AUTOZEEK";

/// Prefix of tags that override the extraction mode for a single file.
pub const AUTOCARVE_TAG_PREFIX: &str = "AUTOCARVE";

/// Is this tag consumed by the router rather than forwarded?
pub fn is_control_tag(tag: &str) -> bool {
    tag == AUTOZEEK_TAG || tag.starts_with(AUTOCARVE_TAG_PREFIX)
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A capture file queued for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Filesystem location of the capture file.
    pub path: PathBuf,
    /// Tags in the order they were received.
    pub tags: Vec<String>,
}

/// Inbound message shape. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct Notification {
    name: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl WorkItem {
    pub fn new(path: impl Into<PathBuf>, tags: Vec<String>) -> Self {
        Self {
            path: path.into(),
            tags,
        }
    }

    /// Decode a `{"name": ..., "tags": [...]}` notification payload.
    ///
    /// Only a JSON object is accepted; serde would otherwise take an array
    /// as the positional form of the struct.
    pub fn from_notification(payload: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "notification is not a JSON object",
            )
            .into());
        }
        let notification: Notification = serde_json::from_value(value)?;
        Ok(Self {
            path: PathBuf::from(notification.name),
            tags: notification.tags.unwrap_or_default(),
        })
    }

    /// Does the referenced capture still exist as a regular file?
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Base name of the capture file, used for archive naming and logs.
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Extraction mode
// ---------------------------------------------------------------------------

/// File carving behaviour requested from the analysis tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Interesting,
    Mapped,
    #[default]
    None,
}

impl ExtractionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMode::Interesting => "interesting",
            ExtractionMode::Mapped => "mapped",
            ExtractionMode::None => "none",
        }
    }

    /// Parse the part of an `AUTOCARVE` tag after the prefix.
    ///
    /// Leading separators are skipped, so `-interesting`, `_mapped` and
    /// `none` are all accepted.
    pub fn from_tag_suffix(suffix: &str) -> Option<Self> {
        suffix
            .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
            .parse()
            .ok()
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown extraction mode '{0}' (expected interesting, mapped or none)")]
pub struct ParseModeError(String);

impl FromStr for ExtractionMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interesting" => Ok(ExtractionMode::Interesting),
            "mapped" => Ok(ExtractionMode::Mapped),
            "none" => Ok(ExtractionMode::None),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Which external tool the dispatcher feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Capture indexing (moloch-capture).
    Capture,
    /// Traffic analysis (zeek).
    Analysis,
}

impl Backend {
    /// Infer the backend from the name the program was invoked under.
    ///
    /// Returns `None` when the name mentions neither tool or both.
    pub fn from_program_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        match (name.contains("moloch"), name.contains("zeek")) {
            (true, false) => Some(Backend::Capture),
            (false, true) => Some(Backend::Analysis),
            _ => None,
        }
    }

    /// Subcommand name used on the command line.
    pub fn command_name(self) -> &'static str {
        match self {
            Backend::Capture => "moloch",
            Backend::Analysis => "zeek",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Backend::Capture => "capture",
            Backend::Analysis => "analysis",
        };
        write!(f, "{s}")
    }
}
