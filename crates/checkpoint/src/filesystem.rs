//! Filesystem-based checkpoint storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::store::CheckpointStore;
use crate::StatusFile;

/// File name of the status document inside a configuration directory.
pub const STATUS_FILE_NAME: &str = "status.yaml";

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores the status document as `<dir>/status.yaml`. Updates are written to
/// a hidden temporary file first and renamed over the document.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE_NAME)
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn read_status(&self) -> Result<StatusFile> {
        let path = self.path();
        if !path.exists() {
            return Ok(StatusFile::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read status: {}", path.display()))?;
        StatusFile::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    async fn write_status(&self, status: &StatusFile) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path();
        let temporary = self.dir.join(format!(".{STATUS_FILE_NAME}"));
        std::fs::write(&temporary, status.to_yaml()?)
            .with_context(|| format!("Failed to write status: {}", temporary.display()))?;
        std::fs::rename(&temporary, &path)
            .with_context(|| format!("Failed to replace status: {}", path.display()))?;
        Ok(())
    }
}
