//! In-memory stand-ins for a MySQL server.
//!
//! [`MemoryMySQL`] answers snapshot and metadata queries from tables held in
//! memory. [`ScriptedBackend`] replays a scripted binlog.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use delta_core::{SourceRow, Value};

use crate::client::{ColumnInfo, Snapshot, SourceClient};
use crate::event::{BinlogBackend, BinlogEvent, BinlogEventKind, BinlogStream, RowsKind};

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("poisoned"))
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    file: String,
    position: u64,
    tables: BTreeMap<(String, String), MemoryTable>,
    n_snapshots: usize,
    n_finished: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMySQL {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMySQL {
    pub fn new(file: &str, position: u64) -> Self {
        let server = Self::default();
        server.set_position(file, position);
        server
    }

    pub fn set_position(&self, file: &str, position: u64) {
        if let Ok(mut state) = lock(&self.state) {
            state.file = file.to_string();
            state.position = position;
        }
    }

    /// The first column is the primary key.
    pub fn create_table(&self, database: &str, table: &str, columns: &[(&str, &str)]) {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, (name, data_type))| ColumnInfo {
                name: name.to_string(),
                ordinal_position: i as u64 + 1,
                data_type: data_type.to_string(),
                is_primary_key: i == 0,
            })
            .collect();
        if let Ok(mut state) = lock(&self.state) {
            state.tables.insert(
                (database.to_string(), table.to_string()),
                MemoryTable {
                    columns,
                    rows: Vec::new(),
                },
            );
        }
    }

    pub fn insert(&self, database: &str, table: &str, row: Vec<Value>) {
        if let Ok(mut state) = lock(&self.state) {
            if let Some(table) = state
                .tables
                .get_mut(&(database.to_string(), table.to_string()))
            {
                table.rows.push(row);
            }
        }
    }

    /// `(snapshots begun, snapshots finished)`
    pub fn snapshot_counts(&self) -> (usize, usize) {
        lock(&self.state)
            .map(|state| (state.n_snapshots, state.n_finished))
            .unwrap_or_default()
    }
}

#[async_trait]
impl SourceClient for MemoryMySQL {
    async fn begin_snapshot(&self) -> Result<Box<dyn Snapshot>> {
        let mut state = lock(&self.state)?;
        state.n_snapshots += 1;
        let tables = state
            .tables
            .iter()
            .map(|(key, table)| {
                let rows = table
                    .rows
                    .iter()
                    .map(|values| {
                        table
                            .columns
                            .iter()
                            .map(|column| column.name.clone())
                            .zip(values.iter().cloned())
                            .collect::<SourceRow>()
                    })
                    .collect();
                (key.clone(), rows)
            })
            .collect();
        Ok(Box::new(MemorySnapshot {
            server: self.clone(),
            file: state.file.clone(),
            position: state.position,
            tables,
        }))
    }

    async fn table_columns(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let state = lock(&self.state)?;
        Ok(state
            .tables
            .get(&(database.to_string(), table.to_string()))
            .map(|table| table.columns.clone())
            .unwrap_or_default())
    }
}

struct MemorySnapshot {
    server: MemoryMySQL,
    file: String,
    position: u64,
    tables: BTreeMap<(String, String), Vec<SourceRow>>,
}

#[async_trait]
impl Snapshot for MemorySnapshot {
    fn file(&self) -> &str {
        &self.file
    }

    fn position(&self) -> u64 {
        self.position
    }

    async fn table_exists(&mut self, database: &str, table: &str) -> Result<bool> {
        Ok(self
            .tables
            .contains_key(&(database.to_string(), table.to_string())))
    }

    /// `filter` is ignored.
    async fn export(
        &mut self,
        database: &str,
        table: &str,
        columns: &[String],
        _filter: Option<&str>,
        on_row: &mut (dyn FnMut(SourceRow) -> Result<()> + Send),
    ) -> Result<()> {
        let rows = self
            .tables
            .get(&(database.to_string(), table.to_string()))
            .ok_or_else(|| anyhow!("Unknown table: {database}.{table}"))?;
        for row in rows {
            let row = if columns.is_empty() {
                row.clone()
            } else {
                row.iter()
                    .filter(|(name, _)| columns.contains(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            };
            on_row(row)?;
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        lock(&self.server.state)?.n_finished += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    files: Vec<(String, Vec<BinlogEvent>)>,
    opened: Vec<(String, u64)>,
}

/// A binlog made of scripted events.
///
/// Opening at `file`:`position` yields a rotate event naming `file`, the
/// events of `file` from `position` on and every event of later files.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, file: &str, event: BinlogEvent) {
        if let Ok(mut state) = lock(&self.state) {
            match state.files.iter_mut().find(|(name, _)| name == file) {
                Some((_, events)) => events.push(event),
                None => state.files.push((file.to_string(), vec![event])),
            }
        }
    }

    /// `(file, position)` of every `open` so far.
    pub fn opened(&self) -> Vec<(String, u64)> {
        lock(&self.state)
            .map(|state| state.opened.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BinlogBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, file: &str, position: u64) -> Result<Box<dyn BinlogStream>> {
        let mut state = lock(&self.state)?;
        state.opened.push((file.to_string(), position));
        let mut events = vec![BinlogEvent {
            position: 0,
            next_position: 0,
            kind: BinlogEventKind::Rotate {
                file: file.to_string(),
                position,
            },
        }];
        let mut started = false;
        for (name, file_events) in &state.files {
            if name == file {
                started = true;
                events.extend(
                    file_events
                        .iter()
                        .filter(|event| event.position >= position)
                        .cloned(),
                );
            } else if started {
                events.extend(file_events.iter().cloned());
            }
        }
        Ok(Box::new(ScriptedStream {
            events: events.into_iter(),
        }))
    }
}

struct ScriptedStream {
    events: std::vec::IntoIter<BinlogEvent>,
}

#[async_trait]
impl BinlogStream for ScriptedStream {
    async fn next_event(&mut self) -> Result<Option<BinlogEvent>> {
        Ok(self.events.next())
    }
}

pub fn table_map_event(position: u64, next_position: u64, database: &str, table: &str) -> BinlogEvent {
    BinlogEvent {
        position,
        next_position,
        kind: BinlogEventKind::TableMap {
            database: database.to_string(),
            table: table.to_string(),
        },
    }
}

pub fn rows_event(
    position: u64,
    next_position: u64,
    kind: RowsKind,
    database: &str,
    table: &str,
    rows: Vec<Vec<Value>>,
) -> BinlogEvent {
    BinlogEvent {
        position,
        next_position,
        kind: BinlogEventKind::Rows {
            kind,
            database: database.to_string(),
            table: table.to_string(),
            rows,
        },
    }
}

pub fn rotate_event(position: u64, next_position: u64, file: &str) -> BinlogEvent {
    BinlogEvent {
        position,
        next_position,
        kind: BinlogEventKind::Rotate {
            file: file.to_string(),
            position: 4,
        },
    }
}
