//! Typed checkpoint access on top of a store.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{store::CheckpointStore, Checkpoint, FilesystemStore, StatusFile};

/// Reads and updates typed checkpoints.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::CheckpointManager;
///
/// let manager = CheckpointManager::filesystem("/etc/groonga-delta");
/// let current: Option<LocalCheckpoint> = manager.read().await?;
/// manager.update(&LocalCheckpoint { number: 12 }).await?;
/// ```
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Manager backed by `<dir>/status.yaml`.
    pub fn filesystem(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FilesystemStore::new(dir)))
    }

    /// Manager backed by an in-memory document.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    /// Read the current checkpoint of type `C`, if one was ever saved.
    pub async fn read<C: Checkpoint>(&self) -> anyhow::Result<Option<C>> {
        self.store.read_status().await?.parse_section::<C>()
    }

    /// Replace the checkpoint of type `C`, keeping every other section.
    pub async fn update<C: Checkpoint>(&self, checkpoint: &C) -> anyhow::Result<()> {
        let mut status = self.store.read_status().await?;
        status.set_section(checkpoint)?;
        self.store.write_status(&status).await?;

        tracing::debug!(
            "Updated {} checkpoint: {}",
            C::SECTION,
            checkpoint.to_cli_string()
        );

        Ok(())
    }

    /// The whole document, for diagnostics.
    pub async fn status(&self) -> anyhow::Result<StatusFile> {
        self.store.read_status().await
    }
}

/// In-memory status store.
#[derive(Default)]
pub struct MemoryStore {
    status: Mutex<StatusFile>,
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read_status(&self) -> anyhow::Result<StatusFile> {
        Ok(self.status.lock().await.clone())
    }

    async fn write_status(&self, status: &StatusFile) -> anyhow::Result<()> {
        *self.status.lock().await = status.clone();
        Ok(())
    }
}
