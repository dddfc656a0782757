//! Checkpoint storage trait
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! status storage operations.

use anyhow::Result;
use async_trait::async_trait;

use crate::StatusFile;

/// Trait for status storage operations.
///
/// Implementations must replace the whole document on `write_status`;
/// a reader never observes a partially written document.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the status document. A missing document is an empty status.
    async fn read_status(&self) -> Result<StatusFile>;

    /// Replace the status document.
    async fn write_status(&self, status: &StatusFile) -> Result<()>;
}
