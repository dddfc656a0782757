//! Checkpoint management for groonga-delta
//!
//! Every importer and the applier keep their progress in a small YAML
//! document, `status.yaml`, next to their configuration. The document has
//! one top-level section per checkpoint kind:
//!
//! ```yaml
//! mysql:
//!   last_file: binlog.000003
//!   last_position: 1203
//!   last_table_map_file: binlog.000003
//!   last_table_map_position: 1101
//! local:
//!   number: 12
//! ```
//!
//! # Architecture
//!
//! - The `Checkpoint` trait is implemented by each source-specific checkpoint
//!   type and names the section it lives in
//! - `StatusFile` is the parsed document
//! - `CheckpointStore` abstracts where the document lives
//! - `CheckpointManager` reads and updates typed checkpoints through a store
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - `status.yaml` on disk, replaced atomically on update
//! - `MemoryStore` - in-process document for tests

mod file;
mod filesystem;
mod manager;
pub mod store;

#[cfg(test)]
mod tests;

pub use file::StatusFile;
pub use filesystem::{FilesystemStore, STATUS_FILE_NAME};
pub use manager::{CheckpointManager, MemoryStore};
pub use store::CheckpointStore;

/// Trait that source-specific checkpoints must implement.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct MyCheckpoint {
///     pub number: u64,
/// }
///
/// impl Checkpoint for MyCheckpoint {
///     const SECTION: &'static str = "mine";
///
///     fn to_cli_string(&self) -> String {
///         self.number.to_string()
///     }
/// }
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Top-level key of the status document holding this checkpoint
    /// (e.g., "mysql", "local").
    const SECTION: &'static str;

    /// Short human readable form used in log messages.
    fn to_cli_string(&self) -> String;
}
