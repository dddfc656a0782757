//! Publishing delta entries.
//!
//! Every entry is written under a hidden name (leading `.`) first and then
//! renamed into place, so readers only ever see complete entries. Packed
//! bundles are built in a hidden directory that is renamed as a whole.

use anyhow::{anyhow, Context, Result};
use arrow::record_batch::RecordBatch;
use delta_core::{Record, Value};
use groonga_command::Command;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::codec::{self, COMMAND_SUFFIX, PARQUET_SUFFIX};
use crate::{Action, Timestamp, DATA_DIR, PACKED_DIR, SCHEMA_DIR};

/// Upsert payloads the writer accepts.
#[derive(Debug, Clone, Copy)]
pub enum Upserts<'a> {
    /// Generated records, written as a `load` command of JSON objects
    Records(&'a [Record]),
    /// Raw `load` values (objects, or arrays with a header row first)
    Values(&'a [serde_json::Value]),
    /// A columnar batch, written as Parquet
    Batch(&'a RecordBatch),
}

impl Upserts<'_> {
    fn suffix(&self) -> &'static str {
        match self {
            Upserts::Batch(_) => PARQUET_SUFFIX,
            _ => COMMAND_SUFFIX,
        }
    }
}

/// Writes delta entries below a delta directory.
#[derive(Debug)]
pub struct DeltaWriter {
    dir: PathBuf,
    last_timestamp: Mutex<Option<Timestamp>>,
}

impl DeltaWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current time, strictly after every timestamp this writer handed out.
    fn next_timestamp(&self) -> Result<Timestamp> {
        let mut last = self
            .last_timestamp
            .lock()
            .map_err(|_| anyhow!("delta writer clock is poisoned"))?;
        let mut timestamp = Timestamp::now();
        if let Some(last) = *last {
            if timestamp <= last {
                timestamp = last.next();
            }
        }
        *last = Some(timestamp);
        Ok(timestamp)
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.dir.join(DATA_DIR).join(table)
    }

    pub fn write_upserts(&self, table: &str, upserts: Upserts<'_>, packed: bool) -> Result<PathBuf> {
        if packed {
            let mut bundle = self.begin_packed(Some(table))?;
            bundle.write_upserts(upserts)?;
            return bundle.commit();
        }
        let timestamp = self.next_timestamp()?;
        let name = format!("{timestamp}-{}{}", Action::Upsert, upserts.suffix());
        let dir = self.table_dir(table).join(timestamp.to_day_name());
        publish(&dir, &name, |path| write_upserts_file(path, table, upserts))
    }

    pub fn write_deletes(&self, table: &str, keys: &[Value]) -> Result<PathBuf> {
        let timestamp = self.next_timestamp()?;
        let name = format!("{timestamp}-{}{COMMAND_SUFFIX}", Action::Delete);
        let dir = self.table_dir(table).join(timestamp.to_day_name());
        publish(&dir, &name, |path| {
            let mut output = BufWriter::new(File::create(path)?);
            for key in keys {
                let delete = Command::new("delete")
                    .with("table", table)
                    .with("key", key.to_argument());
                writeln!(output, "{}", delete.to_command_format())?;
            }
            output.flush()?;
            Ok(())
        })
    }

    pub fn write_schema(&self, command: &Command) -> Result<PathBuf> {
        let timestamp = self.next_timestamp()?;
        let name = format!("{timestamp}{COMMAND_SUFFIX}");
        let dir = self.dir.join(SCHEMA_DIR).join(timestamp.to_day_name());
        publish(&dir, &name, |path| write_schema_file(path, command))
    }

    /// Start a packed bundle in the schema area (`table == None`) or in a
    /// table's data area.
    pub fn begin_packed(&self, table: Option<&str>) -> Result<PackedBundle<'_>> {
        let timestamp = self.next_timestamp()?;
        let area = match table {
            Some(table) => self.table_dir(table),
            None => self.dir.join(SCHEMA_DIR),
        };
        let packed_dir = area.join(PACKED_DIR);
        let temporary_dir = packed_dir.join(format!(".{timestamp}"));
        let dir = packed_dir.join(timestamp.to_name());
        std::fs::create_dir_all(&temporary_dir)
            .with_context(|| format!("Failed to create {}", temporary_dir.display()))?;
        tracing::info!("Start writing: {}", temporary_dir.display());
        Ok(PackedBundle {
            writer: self,
            table: table.map(str::to_string),
            temporary_dir,
            dir,
            n_entries: 0,
        })
    }
}

/// A packed bundle being written. Nothing is visible until [`PackedBundle::commit`].
#[derive(Debug)]
pub struct PackedBundle<'a> {
    writer: &'a DeltaWriter,
    table: Option<String>,
    temporary_dir: PathBuf,
    dir: PathBuf,
    n_entries: usize,
}

impl PackedBundle<'_> {
    pub fn n_entries(&self) -> usize {
        self.n_entries
    }

    pub fn write_upserts(&mut self, upserts: Upserts<'_>) -> Result<()> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| anyhow!("upserts can't be packed into the schema area"))?;
        let timestamp = self.writer.next_timestamp()?;
        let path = self.temporary_dir.join(format!(
            "{timestamp}-{}{}",
            Action::Upsert,
            upserts.suffix()
        ));
        write_upserts_file(&path, table, upserts)?;
        self.n_entries += 1;
        Ok(())
    }

    pub fn write_schema(&mut self, command: &Command) -> Result<()> {
        if self.table.is_some() {
            anyhow::bail!("schema commands can't be packed into a data area");
        }
        let timestamp = self.writer.next_timestamp()?;
        let path = self.temporary_dir.join(format!("{timestamp}{COMMAND_SUFFIX}"));
        write_schema_file(&path, command)?;
        self.n_entries += 1;
        Ok(())
    }

    /// Publish the bundle.
    pub fn commit(self) -> Result<PathBuf> {
        std::fs::rename(&self.temporary_dir, &self.dir).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                self.temporary_dir.display(),
                self.dir.display()
            )
        })?;
        tracing::info!("Wrote: {}", self.dir.display());
        Ok(self.dir)
    }

    /// Drop the bundle without publishing it.
    pub fn abandon(self) -> Result<()> {
        std::fs::remove_dir_all(&self.temporary_dir)
            .with_context(|| format!("Failed to remove {}", self.temporary_dir.display()))
    }
}

fn publish(dir: &Path, name: &str, write: impl FnOnce(&Path) -> Result<()>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let temporary_path = dir.join(format!(".{name}"));
    let path = dir.join(name);
    tracing::info!("Start writing: {}", temporary_path.display());
    write(&temporary_path)
        .with_context(|| format!("Failed to write {}", temporary_path.display()))?;
    std::fs::rename(&temporary_path, &path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temporary_path.display(),
            path.display()
        )
    })?;
    tracing::info!("Wrote: {}", path.display());
    Ok(path)
}

fn write_schema_file(path: &Path, command: &Command) -> Result<()> {
    let mut output = File::create(path)?;
    writeln!(output, "{}", command.to_command_format())?;
    Ok(())
}

fn write_upserts_file(path: &Path, table: &str, upserts: Upserts<'_>) -> Result<()> {
    match upserts {
        Upserts::Batch(batch) => codec::write_batch(path, batch),
        Upserts::Records(records) => {
            write_load(path, table, records.iter().map(Record::to_json_string))
        }
        Upserts::Values(values) => {
            write_load(path, table, values.iter().map(serde_json::Value::to_string))
        }
    }
}

/// `load --table T`, then the values as a JSON array with one value per line.
fn write_load(path: &Path, table: &str, values: impl Iterator<Item = String>) -> Result<()> {
    let mut output = BufWriter::new(File::create(path)?);
    let mut first = true;
    for value in values {
        if first {
            writeln!(output, "load --table {table}")?;
            write!(output, "[")?;
            first = false;
        } else {
            write!(output, ",")?;
        }
        writeln!(output)?;
        write!(output, "{value}")?;
    }
    if !first {
        writeln!(output)?;
        writeln!(output, "]")?;
    }
    output.flush()?;
    Ok(())
}
