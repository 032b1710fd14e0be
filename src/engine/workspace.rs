//! Per-invocation workspace: a private temporary directory the analysis tool
//! runs in and writes its logs to.

use std::path::Path;
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Name of the tool's transient state directory, never archived.
pub const STATE_DIR: &str = ".state";

/// Suffix of the log files the analysis tool produces.
pub const LOG_SUFFIX: &str = ".log";

/// A uniquely named directory removed when dropped, on every exit path.
pub struct Workspace {
    pub id: Uuid,
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace under `base_dir`.
    pub async fn create(base_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(base_dir).await?;
        let id = Uuid::new_v4();
        let prefix = format!("pcap-{id}-");
        let base = base_dir.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(base)
        })
        .await
        .map_err(|e| Error::Other(format!("workspace task failed: {e}")))??;

        debug!(workspace = %id, dir = %dir.path().display(), "workspace created");
        Ok(Self { id, dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the tool's state directory if it left one behind.
    pub async fn remove_state_dir(&self) -> Result<()> {
        let state = self.path().join(STATE_DIR);
        if tokio::fs::metadata(&state).await.is_ok_and(|meta| meta.is_dir()) {
            tokio::fs::remove_dir_all(&state).await?;
        }
        Ok(())
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub async fn cleanup(self) -> Result<()> {
        let Self { id, dir } = self;
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| Error::Other(format!("workspace cleanup task failed: {e}")))??;
        debug!(workspace = %id, "workspace cleaned up");
        Ok(())
    }
}
