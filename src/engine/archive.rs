//! Packages analysis logs into a gzipped tarball and moves it to the output
//! directory.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::engine::workspace::LOG_SUFFIX;
use crate::error::{Error, Result};
use crate::model::file_name_of;

/// What the archiver did with a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Archive written and moved; holds its final location.
    Archived(PathBuf),
    /// The tool produced no logs.
    NoOutput,
    /// Output directory missing or not writable; nothing was written.
    DestinationUnavailable,
}

#[derive(Debug, Clone)]
pub struct Archiver {
    output_dir: PathBuf,
}

impl Archiver {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// `<capture basename>-<tags joined by '_'>-<start micros>.tar.gz`
    pub fn archive_name(source: &Path, tags: &[String], started_micros: i64) -> String {
        format!(
            "{}-{}-{}.tar.gz",
            file_name_of(source),
            tags.join("_"),
            started_micros
        )
    }

    /// Archive `dir` if it holds any logs and move the result to the output
    /// directory.
    pub async fn archive(
        &self,
        dir: &Path,
        source: &Path,
        tags: &[String],
        started_micros: i64,
    ) -> Result<ArchiveOutcome> {
        if !has_logs(dir).await? {
            debug!(source = %source.display(), "no log files produced, nothing to archive");
            return Ok(ArchiveOutcome::NoOutput);
        }

        if !self.destination_writable().await {
            error!(
                output_dir = %self.output_dir.display(),
                source = %source.display(),
                "output directory missing or not writable, skipping archive"
            );
            return Ok(ArchiveOutcome::DestinationUnavailable);
        }

        let name = Self::archive_name(source, tags, started_micros);
        let staged = dir.join(&name);
        let (root, target) = (dir.to_path_buf(), staged.clone());
        tokio::task::spawn_blocking(move || write_archive(&root, &target))
            .await
            .map_err(|e| Error::Archive(format!("archive task failed: {e}")))??;

        let destination = self.output_dir.join(&name);
        match relocate(&staged, &destination).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                error!(
                    output_dir = %self.output_dir.display(),
                    source = %source.display(),
                    error = %e,
                    "output directory not writable, archive not moved"
                );
                return Ok(ArchiveOutcome::DestinationUnavailable);
            }
            Err(e) => {
                return Err(Error::Archive(format!(
                    "failed to move {}: {e}",
                    staged.display()
                )));
            }
        }
        info!(archive = %destination.display(), "archived analysis logs");

        Ok(ArchiveOutcome::Archived(destination))
    }

    /// Whether a file can actually be created in the output directory.
    async fn destination_writable(&self) -> bool {
        let dir = self.output_dir.clone();
        tokio::task::spawn_blocking(move || {
            dir.is_dir() && tempfile::NamedTempFile::new_in(&dir).is_ok()
        })
        .await
        .unwrap_or(false)
    }
}

async fn has_logs(dir: &Path) -> Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().ends_with(LOG_SUFFIX)
            && entry.file_type().await?.is_file()
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Write every entry of `dir` except the archive itself into `archive`.
fn write_archive(dir: &Path, archive: &Path) -> Result<()> {
    let file = File::create(archive)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if path == archive {
            continue;
        }
        let name = entry.file_name();
        if entry.file_type()?.is_dir() {
            builder.append_dir_all(&name, &path)?;
        } else {
            builder.append_path_with_name(&path, &name)?;
        }
    }

    builder.into_inner()?.finish()?.sync_all()?;
    Ok(())
}

/// Move a file, falling back to copy and remove across filesystems.
async fn relocate(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}
