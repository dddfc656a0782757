use super::testing::{rotate_event, rows_event, table_map_event, MemoryMySQL, ScriptedBackend};
use super::*;
use anyhow::Result;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use ::checkpoint::CheckpointManager;
use chrono::{Local, TimeZone};
use delta_core::columnar::batch_to_rows;
use delta_core::Value;
use delta_store::{Action, DeltaReader, DeltaWriter, EntrySink, Timestamp};
use mapping::Mapping;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const MAPPING: &str = r#"
items:
  sources:
    - database: importer
      table: shoes
      columns:
        _key: "shoes-%{id}"
        id: "%{id}"
        name: "%{name}"
        name_text:
          expression: html_untag(name)
        created_at:
          expression: created_at
          source_column_names:
            - created_at
          type: Time
        source: shoes
"#;

#[derive(Debug, PartialEq)]
enum Applied {
    Commands(String),
    Batch {
        table: String,
        action: Action,
        rows: Vec<Vec<serde_json::Value>>,
    },
}

#[derive(Default)]
struct RecordingSink {
    applied: Vec<Applied>,
}

#[async_trait]
impl EntrySink for RecordingSink {
    async fn apply_commands(&mut self, _path: &Path, commands: &[u8]) -> Result<()> {
        self.applied
            .push(Applied::Commands(String::from_utf8_lossy(commands).into_owned()));
        Ok(())
    }

    async fn apply_batch(
        &mut self,
        _path: &Path,
        table: &str,
        action: Action,
        batch: RecordBatch,
    ) -> Result<()> {
        let (_columns, rows) = batch_to_rows(&batch)?;
        self.applied.push(Applied::Batch {
            table: table.to_string(),
            action,
            rows,
        });
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    server: MemoryMySQL,
    backend: ScriptedBackend,
    checkpoints: CheckpointManager,
}

impl Fixture {
    fn new() -> Self {
        let server = MemoryMySQL::new("binlog.000001", 1000);
        server.create_table(
            "importer",
            "shoes",
            &[("id", "int"), ("name", "text"), ("created_at", "timestamp")],
        );
        for id in 1..=3 {
            let letter = char::from(b'a' + id as u8 - 1);
            server.insert("importer", "shoes", shoe(id, &format!("shoes <br> {letter}")));
        }
        Self {
            dir: TempDir::new().unwrap(),
            server,
            backend: ScriptedBackend::new(),
            checkpoints: CheckpointManager::memory(),
        }
    }

    fn source(&self) -> MySQLSource {
        self.source_with_batch_size(DEFAULT_INITIAL_IMPORT_BATCH_SIZE)
    }

    fn source_with_batch_size(&self, batch_size: usize) -> MySQLSource {
        let mapping = Mapping::parse(&serde_yaml::from_str(MAPPING).unwrap()).unwrap();
        MySQLSource::from_parts(
            mapping,
            Arc::new(DeltaWriter::new(self.dir.path())),
            self.checkpoints.clone(),
            Arc::new(self.server.clone()),
            Box::new(self.backend.clone()),
            batch_size,
        )
    }

    async fn applied(&self) -> Vec<Applied> {
        let targets = DeltaReader::new(self.dir.path())
            .targets(Timestamp::epoch(), Timestamp::now())
            .unwrap();
        let mut sink = RecordingSink::default();
        for target in &targets {
            target.apply(&mut sink).await.unwrap();
        }
        sink.applied
    }

    async fn checkpoint(&self) -> MySQLCheckpoint {
        self.checkpoints
            .read::<MySQLCheckpoint>()
            .await
            .unwrap()
            .unwrap()
    }
}

fn created_at(seconds: u32) -> Value {
    Value::Time(Local.with_ymd_and_hms(2022, 1, 19, 0, 0, seconds).unwrap())
}

fn shoe(id: i64, name: &str) -> Vec<Value> {
    vec![
        Value::Int(id),
        Value::Bytes(name.as_bytes().to_vec()),
        created_at(id as u32),
    ]
}

fn load_line(id: i64, name: &str) -> String {
    let Value::Time(time) = created_at(id as u32) else {
        unreachable!()
    };
    format!(
        r#"{{"_key":"shoes-{id}","id":"{id}","name":"{name}","name_text":"{}","created_at":"{}","source":"shoes"}}"#,
        name.replace("<br>", ""),
        delta_core::format_time(&time)
    )
}

fn load(rows: &[(i64, &str)]) -> Applied {
    let lines: Vec<String> = rows.iter().map(|(id, name)| load_line(*id, name)).collect();
    Applied::Commands(format!("load --table items\n[\n{}\n]\n", lines.join(",\n")))
}

/// The changes of the import scenario: three inserts, a delete of two of
/// them, an insert and an update.
fn script_changes(backend: &ScriptedBackend) {
    let file = "binlog.000001";
    backend.push(file, table_map_event(1000, 1050, "importer", "shoes"));
    backend.push(
        file,
        rows_event(
            1050,
            1200,
            RowsKind::Write,
            "importer",
            "shoes",
            vec![
                shoe(10, "shoes <br> A"),
                shoe(20, "shoes <br> B"),
                shoe(30, "shoes <br> C"),
            ],
        ),
    );
    backend.push(file, table_map_event(1200, 1250, "importer", "shoes"));
    backend.push(
        file,
        rows_event(
            1250,
            1400,
            RowsKind::Delete,
            "importer",
            "shoes",
            vec![shoe(20, "shoes <br> B"), shoe(30, "shoes <br> C")],
        ),
    );
    backend.push(file, table_map_event(1400, 1450, "importer", "shoes"));
    backend.push(
        file,
        rows_event(1450, 1550, RowsKind::Write, "importer", "shoes", vec![shoe(40, "shoes <br> D")]),
    );
    backend.push(file, table_map_event(1550, 1600, "importer", "shoes"));
    backend.push(
        file,
        rows_event(1600, 1700, RowsKind::Update, "importer", "shoes", vec![shoe(40, "shoes <br> X")]),
    );
}

fn snapshot_rows() -> Vec<Vec<serde_json::Value>> {
    ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, letter)| {
            let id = i as i64 + 1;
            let Value::Time(time) = created_at(id as u32) else {
                unreachable!()
            };
            vec![
                json!(format!("shoes-{id}")),
                json!(id.to_string()),
                json!(format!("shoes <br> {letter}")),
                json!(format!("shoes  {letter}")),
                json!(delta_core::format_time(&time)),
                json!("shoes"),
            ]
        })
        .collect()
}

// =============================================================================
// Initial import
// =============================================================================

#[tokio::test]
async fn test_first_run_snapshots_existing_rows() {
    let fixture = Fixture::new();
    fixture.source().import().await.unwrap();

    assert_eq!(
        fixture.applied().await,
        vec![Applied::Batch {
            table: "items".to_string(),
            action: Action::Upsert,
            rows: snapshot_rows(),
        }]
    );
    assert_eq!(
        fixture.checkpoint().await,
        MySQLCheckpoint::at("binlog.000001", 1000)
    );
    assert_eq!(fixture.server.snapshot_counts(), (1, 1));
    assert_eq!(
        fixture.backend.opened(),
        vec![("binlog.000001".to_string(), 1000)]
    );
}

#[tokio::test]
async fn test_small_batches_share_one_bundle() {
    let fixture = Fixture::new();
    fixture.source_with_batch_size(1).import().await.unwrap();

    let applied = fixture.applied().await;
    assert_eq!(applied.len(), 3);
    let rows: Vec<_> = applied
        .into_iter()
        .flat_map(|applied| match applied {
            Applied::Batch { rows, .. } => rows,
            Applied::Commands(commands) => panic!("unexpected commands: {commands}"),
        })
        .collect();
    assert_eq!(rows, snapshot_rows());
}

#[tokio::test]
async fn test_missing_table_writes_no_bundle() {
    let fixture = Fixture::new();
    let server = MemoryMySQL::new("binlog.000001", 4);
    let mapping = Mapping::parse(&serde_yaml::from_str(MAPPING).unwrap()).unwrap();
    let mut source = MySQLSource::from_parts(
        mapping,
        Arc::new(DeltaWriter::new(fixture.dir.path())),
        fixture.checkpoints.clone(),
        Arc::new(server),
        Box::new(fixture.backend.clone()),
        DEFAULT_INITIAL_IMPORT_BATCH_SIZE,
    );
    source.import().await.unwrap();

    assert_eq!(fixture.applied().await, vec![]);
    assert_eq!(
        fixture.checkpoint().await,
        MySQLCheckpoint::at("binlog.000001", 4)
    );
}

// =============================================================================
// Binlog replay
// =============================================================================

#[tokio::test]
async fn test_second_run_imports_changes() {
    let fixture = Fixture::new();
    fixture.source().import().await.unwrap();

    script_changes(&fixture.backend);
    fixture.source().import().await.unwrap();

    let applied = fixture.applied().await;
    assert_eq!(applied.len(), 5);
    assert_eq!(
        &applied[1..],
        &[
            load(&[(10, "shoes <br> A"), (20, "shoes <br> B"), (30, "shoes <br> C")]),
            Applied::Commands(
                "delete --key \"shoes-20\" --table \"items\"\ndelete --key \"shoes-30\" --table \"items\"\n"
                    .to_string()
            ),
            load(&[(40, "shoes <br> D")]),
            load(&[(40, "shoes <br> X")]),
        ]
    );
    assert_eq!(
        fixture.checkpoint().await,
        MySQLCheckpoint {
            last_file: "binlog.000001".to_string(),
            last_position: 1700,
            last_table_map_file: "binlog.000001".to_string(),
            last_table_map_position: 1550,
        }
    );
}

#[tokio::test]
async fn test_resume_does_not_reimport() {
    let fixture = Fixture::new();
    fixture.source().import().await.unwrap();
    script_changes(&fixture.backend);
    fixture.source().import().await.unwrap();
    let before = fixture.applied().await.len();

    fixture.source().import().await.unwrap();

    assert_eq!(fixture.applied().await.len(), before);
    assert_eq!(
        fixture.backend.opened().last(),
        Some(&("binlog.000001".to_string(), 1550))
    );
    assert_eq!(fixture.server.snapshot_counts(), (1, 1));
}

#[tokio::test]
async fn test_unmapped_table_is_ignored() {
    let fixture = Fixture::new();
    fixture.source().import().await.unwrap();
    fixture
        .backend
        .push("binlog.000001", table_map_event(1000, 1050, "importer", "hats"));
    fixture.backend.push(
        "binlog.000001",
        rows_event(1050, 1100, RowsKind::Write, "importer", "hats", vec![vec![Value::Int(1)]]),
    );
    fixture.source().import().await.unwrap();

    assert_eq!(fixture.applied().await.len(), 1);
    assert_eq!(
        fixture.checkpoint().await,
        MySQLCheckpoint::at("binlog.000001", 1000)
    );
}

#[tokio::test]
async fn test_rotation_moves_checkpoint_to_next_file() {
    let fixture = Fixture::new();
    fixture.source().import().await.unwrap();
    fixture
        .backend
        .push("binlog.000001", rotate_event(1000, 1050, "binlog.000002"));
    fixture
        .backend
        .push("binlog.000002", table_map_event(4, 60, "importer", "shoes"));
    fixture.backend.push(
        "binlog.000002",
        rows_event(60, 200, RowsKind::Write, "importer", "shoes", vec![shoe(50, "shoes <br> E")]),
    );
    fixture.source().import().await.unwrap();

    let applied = fixture.applied().await;
    assert_eq!(applied.last(), Some(&load(&[(50, "shoes <br> E")])));
    assert_eq!(
        fixture.checkpoint().await,
        MySQLCheckpoint {
            last_file: "binlog.000002".to_string(),
            last_position: 200,
            last_table_map_file: "binlog.000002".to_string(),
            last_table_map_position: 4,
        }
    );

    // Reopened in the new file, earlier positions of the old file do not matter
    fixture.source().import().await.unwrap();
    assert_eq!(fixture.applied().await.len(), applied.len());
    assert_eq!(
        fixture.backend.opened().last(),
        Some(&("binlog.000002".to_string(), 4))
    );
}

#[tokio::test]
async fn test_generation_error_keeps_checkpoint() {
    let fixture = Fixture::new();
    fixture.source().import().await.unwrap();
    let file = "binlog.000001";
    fixture
        .backend
        .push(file, table_map_event(1000, 1050, "importer", "shoes"));
    fixture.backend.push(
        file,
        rows_event(1050, 1200, RowsKind::Write, "importer", "shoes", vec![shoe(10, "shoes <br> A")]),
    );
    fixture
        .backend
        .push(file, table_map_event(1200, 1250, "importer", "shoes"));
    // U+3042 in EUC-JP
    let broken = vec![Value::Int(11), Value::Bytes(vec![0xa4, 0xa2]), created_at(11)];
    fixture.backend.push(
        file,
        rows_event(1250, 1400, RowsKind::Write, "importer", "shoes", vec![broken]),
    );

    let error = fixture.source().import().await.unwrap_err();
    assert!(
        error.chain().any(|cause| cause.is::<mapping::GenerationError>()),
        "{error:#}"
    );

    let applied = fixture.applied().await;
    assert_eq!(applied.len(), 2);
    assert_eq!(applied.last(), Some(&load(&[(10, "shoes <br> A")])));
    assert_eq!(
        fixture.checkpoint().await,
        MySQLCheckpoint {
            last_file: "binlog.000001".to_string(),
            last_position: 1200,
            last_table_map_file: "binlog.000001".to_string(),
            last_table_map_position: 1000,
        }
    );
}

// =============================================================================
// Connection settings
// =============================================================================

#[test]
fn test_backend_kind() {
    assert_eq!("replication".parse(), Ok(BackendKind::Replication));
    assert_eq!("mysqlbinlog".parse(), Ok(BackendKind::Mysqlbinlog));
    assert!("binlog".parse::<BackendKind>().is_err());
}

#[test]
fn test_password_is_hidden() {
    let options = ConnectionOptions {
        user: Some("replicator".to_string()),
        password: Some("secret".to_string()),
        ..Default::default()
    };
    let debug = format!("{options:?}");
    assert!(!debug.contains("secret"));
    assert_eq!(options.endpoint(), "localhost:3306");
}
