use anyhow::{Context, Result};
use checkpoint::CheckpointManager;
use delta_core::Value;
use delta_store::{DeltaWriter, Upserts};
use groonga_command::{Command, ParseEvent, Parser};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{LocalCheckpoint, LocalConfig};

/// Records per upsert entry when re-batching `load` values.
pub const LOAD_CHUNK_SIZE: usize = 10_000;

/// A command that can't be expressed as delta entries.
#[derive(Debug, thiserror::Error)]
#[error("delete by not _key isn't supported yet: {0}")]
pub struct UnsupportedError(pub String);

/// Imports numbered command files from [`LocalConfig::dir`].
pub struct LocalSource {
    config: LocalConfig,
    writer: Arc<DeltaWriter>,
    checkpoints: CheckpointManager,
}

impl LocalSource {
    pub fn new(config: LocalConfig, writer: Arc<DeltaWriter>, checkpoints: CheckpointManager) -> Self {
        Self {
            config,
            writer,
            checkpoints,
        }
    }

    pub async fn import(&self) -> Result<()> {
        let latest = self.checkpoints.read::<LocalCheckpoint>().await?;
        let latest_number = latest.map(|checkpoint| checkpoint.number);

        for (number, path) in self.list_files(latest_number)? {
            if latest_number.is_none()
                && self
                    .config
                    .initial_max_number
                    .is_some_and(|max| number > max)
            {
                info!("Stopped initial import");
                break;
            }
            info!("Start importing: {}", path.display());
            self.import_file(&path)
                .with_context(|| format!("Failed to import {}", path.display()))?;
            info!("Imported: {}", path.display());
            self.checkpoints.update(&LocalCheckpoint { number }).await?;
        }
        Ok(())
    }

    /// `<digits>*.grn` files newer than `latest_number`, in numeric order.
    fn list_files(&self, latest_number: Option<u64>) -> Result<Vec<(u64, PathBuf)>> {
        let dir = &self.config.dir;
        if !dir.is_dir() {
            debug!("Local directory doesn't exist: {}", dir.display());
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
            let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.ends_with(".grn") {
                continue;
            }
            let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
            let Ok(number) = digits.parse::<u64>() else {
                continue;
            };
            if latest_number.is_some_and(|latest| number <= latest) {
                continue;
            }
            files.push((number, entry.path()));
        }
        files.sort();
        Ok(files)
    }

    fn import_file(&self, path: &Path) -> Result<()> {
        let mut input = BufReader::new(File::open(path)?);
        let mut parser = Parser::new();
        let mut importer = CommandImporter::new(&self.writer);
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            for event in parser.feed(&line)? {
                importer.handle(event)?;
            }
        }
        for event in parser.finish()? {
            importer.handle(event)?;
        }
        Ok(())
    }
}

struct PendingLoad {
    command: Command,
    values: Vec<serde_json::Value>,
}

/// Turns parse events of one command file into delta entries.
struct CommandImporter<'a> {
    writer: &'a DeltaWriter,
    load: Option<PendingLoad>,
}

impl<'a> CommandImporter<'a> {
    fn new(writer: &'a DeltaWriter) -> Self {
        Self { writer, load: None }
    }

    fn handle(&mut self, event: ParseEvent) -> Result<()> {
        match event {
            ParseEvent::Command(command) => self.write_command(&command)?,
            ParseEvent::LoadStart(command) => {
                self.load = Some(PendingLoad {
                    command,
                    values: Vec::new(),
                });
            }
            ParseEvent::LoadColumns(columns) => {
                if let Some(load) = &mut self.load {
                    if load.command.get("columns").is_none() {
                        load.command.set("columns", columns.join(","));
                    }
                }
            }
            ParseEvent::LoadValue(value) => {
                if let Some(load) = &mut self.load {
                    load.values.push(value);
                    if load.values.len() == LOAD_CHUNK_SIZE {
                        let values = std::mem::take(&mut load.values);
                        write_load(self.writer, &load.command, values)?;
                    }
                }
            }
            ParseEvent::LoadComplete(command) => match command.get("values") {
                Some(values) => {
                    let values = match serde_json::from_str(values)
                        .with_context(|| format!("Invalid load values: {values}"))?
                    {
                        serde_json::Value::Array(values) => values,
                        value => vec![value],
                    };
                    write_load(self.writer, &command, values)?;
                }
                None => {
                    if let Some(load) = self.load.take() {
                        if !load.values.is_empty() {
                            write_load(self.writer, &load.command, load.values)?;
                        }
                    }
                }
            },
        }
        Ok(())
    }

    fn write_command(&self, command: &Command) -> Result<()> {
        if command.name() != "delete" {
            self.writer.write_schema(command)?;
            return Ok(());
        }
        let Some(key) = command.get("key") else {
            return Err(UnsupportedError(command.to_command_format()).into());
        };
        let table = command
            .table()
            .with_context(|| format!("delete without table: {}", command.to_command_format()))?;
        self.writer.write_deletes(table, &[Value::from(key)])?;
        Ok(())
    }
}

fn write_load(writer: &DeltaWriter, command: &Command, values: Vec<serde_json::Value>) -> Result<()> {
    let table = command
        .table()
        .with_context(|| format!("load without table: {}", command.to_command_format()))?;
    let values = match command.columns() {
        Some(columns) => {
            let header = serde_json::Value::Array(
                columns.into_iter().map(serde_json::Value::String).collect(),
            );
            std::iter::once(header).chain(values).collect()
        }
        None => values,
    };
    writer.write_upserts(table, Upserts::Values(&values), false)?;
    Ok(())
}
