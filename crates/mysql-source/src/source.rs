//! The MySQL import run: initial snapshot, then binlog replay.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use checkpoint::{Checkpoint, CheckpointManager};
use delta_core::{SourceRow, Value, KEY_COLUMN};
use delta_store::{DeltaWriter, PackedBundle, Upserts};
use mapping::{GroongaTable, Mapping, SourceTable};
use tracing::{debug, info};

use crate::checkpoint::MySQLCheckpoint;
use crate::client::{ColumnInfo, MySQLClient, Snapshot, SourceClient};
use crate::event::{BinlogBackend, BinlogEvent, BinlogEventKind, RowsKind};
use crate::mysqlbinlog::MysqlbinlogBackend;
use crate::replication::ReplicationBackend;
use crate::{BackendKind, MySQLConfig};

pub struct MySQLSource {
    mapping: Mapping,
    writer: Arc<DeltaWriter>,
    checkpoints: CheckpointManager,
    client: Arc<dyn SourceClient>,
    backend: Box<dyn BinlogBackend>,
    initial_import_batch_size: usize,
    tables: HashMap<(String, String), Arc<Vec<ColumnInfo>>>,
}

impl MySQLSource {
    pub fn new(
        config: MySQLConfig,
        mapping: Mapping,
        writer: Arc<DeltaWriter>,
        checkpoints: CheckpointManager,
    ) -> Self {
        let client = Arc::new(MySQLClient::new(
            config.replication_client.clone(),
            config.select.clone(),
        ));
        let backend: Box<dyn BinlogBackend> = match config.backend {
            BackendKind::Replication => Box::new(ReplicationBackend::new(
                config.replication_slave.clone(),
                config.server_id,
                config.idle_timeout,
            )),
            BackendKind::Mysqlbinlog => Box::new(MysqlbinlogBackend::new(
                config.replication_slave.clone(),
                config.mysqlbinlog.clone(),
                config.binlog_dir.clone(),
            )),
        };
        Self::from_parts(
            mapping,
            writer,
            checkpoints,
            client,
            backend,
            config.initial_import_batch_size,
        )
    }

    pub fn from_parts(
        mapping: Mapping,
        writer: Arc<DeltaWriter>,
        checkpoints: CheckpointManager,
        client: Arc<dyn SourceClient>,
        backend: Box<dyn BinlogBackend>,
        initial_import_batch_size: usize,
    ) -> Self {
        Self {
            mapping,
            writer,
            checkpoints,
            client,
            backend,
            initial_import_batch_size,
            tables: HashMap::new(),
        }
    }

    /// One import run. Without a checkpoint the mapped tables are
    /// snapshotted first.
    pub async fn import(&mut self) -> Result<()> {
        let checkpoint = match self.checkpoints.read::<MySQLCheckpoint>().await? {
            Some(checkpoint) => checkpoint,
            None => self.import_existing_data().await?,
        };
        info!(
            "Start importing binlog ({}): {}",
            self.backend.name(),
            checkpoint.to_cli_string()
        );
        let mut stream = self
            .backend
            .open(
                &checkpoint.last_table_map_file,
                checkpoint.last_table_map_position,
            )
            .await?;
        let mut state = StreamState::new(checkpoint);
        while let Some(event) = stream.next_event().await? {
            self.process_event(&mut state, event).await?;
        }
        info!("Imported binlog: {}", state.checkpoint.to_cli_string());
        Ok(())
    }

    async fn process_event(&mut self, state: &mut StreamState, event: BinlogEvent) -> Result<()> {
        match event.kind {
            BinlogEventKind::Rotate { file, position } => {
                if file == state.file {
                    return Ok(());
                }
                info!("Rotated: {} -> {file}", state.file);
                state.file = file.clone();
                state.resume = None;
                state.checkpoint = MySQLCheckpoint::at(file, position);
                state.last_table_map_file = state.checkpoint.last_table_map_file.clone();
                state.last_table_map_position = state.checkpoint.last_table_map_position;
                self.checkpoints.update(&state.checkpoint).await?;
            }
            _ if state.is_before_resume_point(event.position) => {
                debug!("Skip: {}:{}", state.file, event.position);
            }
            BinlogEventKind::TableMap { .. } => {
                state.last_table_map_file = state.file.clone();
                state.last_table_map_position = event.position;
            }
            BinlogEventKind::Rows {
                kind,
                database,
                table,
                rows,
            } => {
                if state.is_imported(event.position) {
                    debug!("Already imported: {}:{}", state.file, event.position);
                    return Ok(());
                }
                if self.import_rows(kind, &database, &table, rows).await? {
                    state.checkpoint = MySQLCheckpoint {
                        last_file: state.file.clone(),
                        last_position: event.next_position,
                        last_table_map_file: state.last_table_map_file.clone(),
                        last_table_map_position: state.last_table_map_position,
                    };
                    self.checkpoints.update(&state.checkpoint).await?;
                }
            }
            BinlogEventKind::Other => {}
        }
        Ok(())
    }

    /// Returns whether anything was written.
    async fn import_rows(
        &mut self,
        kind: RowsKind,
        database: &str,
        table: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<bool> {
        let Some(groonga_table) = self
            .mapping
            .source_table(database, table)
            .map(|source_table| source_table.groonga_table.clone())
        else {
            return Ok(false);
        };
        let columns = self.find_table(database, table).await?;
        let source_rows: Vec<SourceRow> = rows
            .into_iter()
            .map(|values| {
                columns
                    .iter()
                    .map(|column| column.name.clone())
                    .zip(values)
                    .collect()
            })
            .collect();
        let records = groonga_table.generate_records(&source_rows)?;
        if records.is_empty() {
            return Ok(false);
        }
        let name = groonga_table.name();
        let path = match kind {
            RowsKind::Write | RowsKind::Update => {
                self.writer
                    .write_upserts(name, Upserts::Records(&records), false)?
            }
            RowsKind::Delete => {
                let keys = records
                    .iter()
                    .map(|record| record.get(KEY_COLUMN).cloned())
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| anyhow!("Mapping for {name} has no {KEY_COLUMN} column"))?;
                self.writer.write_deletes(name, &keys)?
            }
        };
        debug!(
            "Imported {} rows: {database}.{table} -> {}",
            records.len(),
            path.display()
        );
        Ok(true)
    }

    async fn find_table(&mut self, database: &str, table: &str) -> Result<Arc<Vec<ColumnInfo>>> {
        let key = (database.to_string(), table.to_string());
        if let Some(columns) = self.tables.get(&key) {
            return Ok(columns.clone());
        }
        let columns = self.client.table_columns(database, table).await?;
        if columns.is_empty() {
            return Err(anyhow!("Unknown source table: {database}.{table}"));
        }
        let columns = Arc::new(columns);
        self.tables.insert(key, columns.clone());
        Ok(columns)
    }

    /// Snapshot every mapped table into one packed bundle per destination
    /// table and return the checkpoint matching the snapshot.
    async fn import_existing_data(&self) -> Result<MySQLCheckpoint> {
        let mut snapshot = self.client.begin_snapshot().await?;
        let checkpoint = MySQLCheckpoint::at(snapshot.file(), snapshot.position());
        info!("Start initial import: {}", checkpoint.to_cli_string());
        let result = self.export_tables(snapshot.as_mut()).await;
        snapshot.finish().await?;
        result?;
        self.checkpoints.update(&checkpoint).await?;
        info!("Finished initial import: {}", checkpoint.to_cli_string());
        Ok(checkpoint)
    }

    async fn export_tables(&self, snapshot: &mut dyn Snapshot) -> Result<()> {
        let mut destinations: Vec<(&str, Vec<(&str, &SourceTable)>)> = Vec::new();
        for database in self.mapping.source_databases() {
            for source_table in &database.source_tables {
                let name = source_table.groonga_table.name();
                let index = match destinations.iter().position(|(n, _)| *n == name) {
                    Some(index) => index,
                    None => {
                        destinations.push((name, Vec::new()));
                        destinations.len() - 1
                    }
                };
                destinations[index]
                    .1
                    .push((database.name.as_str(), source_table));
            }
        }

        for (name, sources) in destinations {
            let mut bundle = self.writer.begin_packed(Some(name))?;
            for (database, source_table) in sources {
                let result = self
                    .export_table(snapshot, &mut bundle, database, source_table)
                    .await;
                if let Err(error) = result {
                    bundle.abandon()?;
                    return Err(error);
                }
            }
            if bundle.n_entries() == 0 {
                bundle.abandon()?;
            } else {
                bundle.commit()?;
            }
        }
        Ok(())
    }

    async fn export_table(
        &self,
        snapshot: &mut dyn Snapshot,
        bundle: &mut PackedBundle<'_>,
        database: &str,
        source_table: &SourceTable,
    ) -> Result<()> {
        let table = source_table.name.as_str();
        let groonga_table = &source_table.groonga_table;
        let label = format!("{database}.{table} -> {}", groonga_table.name());
        if !snapshot.table_exists(database, table).await? {
            info!("Skip missing table: {label}");
            return Ok(());
        }
        info!("Start importing: {label}");
        let mut batcher = Batcher {
            bundle,
            groonga_table,
            label: &label,
            rows: Vec::new(),
            bytes: 0,
            batch_size: self.initial_import_batch_size,
            n_imported: 0,
        };
        let mut on_row = |row: SourceRow| batcher.push(row);
        snapshot
            .export(
                database,
                table,
                &source_table.source_column_names,
                source_table.filter.as_deref(),
                &mut on_row,
            )
            .await?;
        batcher.flush()?;
        info!("Imported: {label}: {}", batcher.n_imported);
        Ok(())
    }
}

/// Groups snapshot rows into batches of roughly `batch_size` bytes.
struct Batcher<'a, 'b> {
    bundle: &'a mut PackedBundle<'b>,
    groonga_table: &'a GroongaTable,
    label: &'a str,
    rows: Vec<SourceRow>,
    bytes: usize,
    batch_size: usize,
    n_imported: usize,
}

impl Batcher<'_, '_> {
    fn push(&mut self, row: SourceRow) -> Result<()> {
        self.bytes += row.iter().map(|(name, value)| name.len() + value_size(value)).sum::<usize>();
        self.rows.push(row);
        if self.bytes >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        debug!("Generating records: {}", self.label);
        let batch = self.groonga_table.generate_batch(&self.rows)?;
        debug!("Generated records: {}", self.label);
        self.bundle.write_upserts(Upserts::Batch(&batch))?;
        self.n_imported += self.rows.len();
        info!(
            "Importing: {}: {}(+{})",
            self.label,
            self.n_imported,
            self.rows.len()
        );
        self.rows.clear();
        self.bytes = 0;
        Ok(())
    }
}

fn value_size(value: &Value) -> usize {
    match value {
        Value::Text(text) => text.len(),
        Value::Bytes(bytes) => bytes.len(),
        _ => std::mem::size_of::<u64>(),
    }
}

/// Position tracking while replaying one stream.
struct StreamState {
    /// Last persisted checkpoint
    checkpoint: MySQLCheckpoint,
    /// Binlog file the current events belong to
    file: String,
    last_table_map_file: String,
    last_table_map_position: u64,
    /// Set until the stream leaves the file it was reopened in
    resume: Option<ResumePoint>,
}

struct ResumePoint {
    table_map_position: u64,
    /// Rows events ending at or before this were imported already
    imported_position: Option<u64>,
}

impl StreamState {
    fn new(checkpoint: MySQLCheckpoint) -> Self {
        let imported_position = (checkpoint.last_file == checkpoint.last_table_map_file)
            .then_some(checkpoint.last_position);
        Self {
            file: checkpoint.last_table_map_file.clone(),
            last_table_map_file: checkpoint.last_table_map_file.clone(),
            last_table_map_position: checkpoint.last_table_map_position,
            resume: Some(ResumePoint {
                table_map_position: checkpoint.last_table_map_position,
                imported_position,
            }),
            checkpoint,
        }
    }

    fn is_before_resume_point(&self, position: u64) -> bool {
        self.resume
            .as_ref()
            .is_some_and(|resume| position < resume.table_map_position)
    }

    fn is_imported(&self, position: u64) -> bool {
        self.resume
            .as_ref()
            .and_then(|resume| resume.imported_position)
            .is_some_and(|imported| position < imported)
    }
}
