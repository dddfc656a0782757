//! Delta targets: what the reader yields and what the applier and the
//! vacuumer act on.

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::codec::{self, COMMAND_SUFFIX, PARQUET_SUFFIX};
use crate::Timestamp;

/// Action tag of a data entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Upsert,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Upsert => "upsert",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Action::Upsert),
            "delete" => Ok(Action::Delete),
            _ => Err(()),
        }
    }
}

/// Content encoding of a data entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFormat {
    /// Groonga command text (`.grn`)
    Command,
    /// Parquet (`.parquet`)
    Parquet,
}

impl EntryFormat {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            COMMAND_SUFFIX => Some(EntryFormat::Command),
            PARQUET_SUFFIX => Some(EntryFormat::Parquet),
            _ => None,
        }
    }
}

/// A loose schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    pub path: PathBuf,
    pub timestamp: Timestamp,
}

/// A loose data entry of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub path: PathBuf,
    pub timestamp: Timestamp,
    pub table: String,
    pub action: Action,
    pub format: EntryFormat,
}

/// Receives delta entry contents during apply.
#[async_trait]
pub trait EntrySink: Send {
    /// Replay Groonga commands read from `path`. The bytes are passed on
    /// as stored; decoding is up to the sink.
    async fn apply_commands(&mut self, path: &Path, commands: &[u8]) -> Result<()>;

    /// Load or delete the rows of a columnar batch read from `path`.
    async fn apply_batch(
        &mut self,
        path: &Path,
        table: &str,
        action: Action,
        batch: RecordBatch,
    ) -> Result<()>;
}

/// One unit of the ordered delta log.
///
/// Packed variants are applied and vacuumed as a whole but carry their
/// members in timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaTarget {
    Schema(SchemaEntry),
    Table(TableEntry),
    PackedSchema {
        path: PathBuf,
        timestamp: Timestamp,
        members: Vec<SchemaEntry>,
    },
    PackedTable {
        path: PathBuf,
        timestamp: Timestamp,
        table: String,
        members: Vec<TableEntry>,
    },
}

impl DeltaTarget {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DeltaTarget::Schema(entry) => entry.timestamp,
            DeltaTarget::Table(entry) => entry.timestamp,
            DeltaTarget::PackedSchema { timestamp, .. } => *timestamp,
            DeltaTarget::PackedTable { timestamp, .. } => *timestamp,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            DeltaTarget::Schema(entry) => &entry.path,
            DeltaTarget::Table(entry) => &entry.path,
            DeltaTarget::PackedSchema { path, .. } => path,
            DeltaTarget::PackedTable { path, .. } => path,
        }
    }

    pub fn is_packed(&self) -> bool {
        matches!(
            self,
            DeltaTarget::PackedSchema { .. } | DeltaTarget::PackedTable { .. }
        )
    }

    pub async fn apply<S: EntrySink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        info!("Start applying: {}", self.path().display());
        match self {
            DeltaTarget::Schema(entry) => apply_schema(entry, sink).await?,
            DeltaTarget::Table(entry) => apply_table(entry, sink).await?,
            DeltaTarget::PackedSchema { members, .. } => {
                for entry in members {
                    apply_schema(entry, sink).await?;
                }
            }
            DeltaTarget::PackedTable { members, .. } => {
                for entry in members {
                    apply_table(entry, sink).await?;
                }
            }
        }
        info!("Applied: {}", self.path().display());
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        let path = self.path();
        info!("Start vacuuming: {}", path.display());
        match self {
            DeltaTarget::Schema(_) | DeltaTarget::Table(_) => remove_file(path)?,
            DeltaTarget::PackedSchema { members, .. } => {
                for entry in members {
                    remove_file(&entry.path)?;
                }
                remove_dir(path)?;
            }
            DeltaTarget::PackedTable { members, .. } => {
                for entry in members {
                    remove_file(&entry.path)?;
                }
                remove_dir(path)?;
            }
        }
        info!("Vacuumed: {}", path.display());
        Ok(())
    }
}

async fn apply_schema<S: EntrySink + ?Sized>(entry: &SchemaEntry, sink: &mut S) -> Result<()> {
    let commands = read_bytes(&entry.path)?;
    sink.apply_commands(&entry.path, &commands).await
}

async fn apply_table<S: EntrySink + ?Sized>(entry: &TableEntry, sink: &mut S) -> Result<()> {
    match entry.format {
        EntryFormat::Command => {
            let commands = read_bytes(&entry.path)?;
            sink.apply_commands(&entry.path, &commands).await
        }
        EntryFormat::Parquet => {
            for batch in codec::read_batches(&entry.path)? {
                sink.apply_batch(&entry.path, &entry.table, entry.action, batch)
                    .await?;
            }
            Ok(())
        }
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result.with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Remove a bundle directory after its members. Anything left over that
/// the reader didn't recognize goes with it.
fn remove_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result.with_context(|| format!("Failed to remove {}", path.display())),
    }
}
