//! Unit tests for the checkpoint crate.

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::{Checkpoint, CheckpointManager, CheckpointStore, FilesystemStore, StatusFile};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct CounterCheckpoint {
    number: u64,
}

impl Checkpoint for CounterCheckpoint {
    const SECTION: &'static str = "counter";

    fn to_cli_string(&self) -> String {
        self.number.to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct PositionCheckpoint {
    file: String,
    position: u64,
}

impl Checkpoint for PositionCheckpoint {
    const SECTION: &'static str = "position";

    fn to_cli_string(&self) -> String {
        format!("{}:{}", self.file, self.position)
    }
}

// ============================================================================
// StatusFile Tests
// ============================================================================

#[test]
fn test_empty_document_is_empty_status() {
    assert!(StatusFile::parse("").unwrap().is_empty());
    assert!(StatusFile::parse("---\n").unwrap().is_empty());
}

#[test]
fn test_non_mapping_document_is_rejected() {
    assert!(StatusFile::parse("- 1\n- 2\n").is_err());
}

#[test]
fn test_missing_section_is_none() {
    let status = StatusFile::parse("counter:\n  number: 3\n").unwrap();
    let position: Option<PositionCheckpoint> = status.parse_section().unwrap();
    assert!(position.is_none());
    let counter: Option<CounterCheckpoint> = status.parse_section().unwrap();
    assert_eq!(counter, Some(CounterCheckpoint { number: 3 }));
}

#[test]
fn test_invalid_section_is_an_error() {
    let status = StatusFile::parse("counter:\n  number: abc\n").unwrap();
    let result: anyhow::Result<Option<CounterCheckpoint>> = status.parse_section();
    assert!(result.is_err());
}

// ============================================================================
// Manager Tests
// ============================================================================

#[tokio::test]
async fn test_update_keeps_other_sections() {
    let tmp = TempDir::new().unwrap();
    let manager = CheckpointManager::filesystem(tmp.path());

    manager
        .update(&CounterCheckpoint { number: 1 })
        .await
        .unwrap();
    manager
        .update(&PositionCheckpoint {
            file: "binlog.000001".to_string(),
            position: 4,
        })
        .await
        .unwrap();
    manager
        .update(&CounterCheckpoint { number: 2 })
        .await
        .unwrap();

    let counter: CounterCheckpoint = manager.read().await.unwrap().unwrap();
    let position: PositionCheckpoint = manager.read().await.unwrap().unwrap();
    assert_eq!(counter.number, 2);
    assert_eq!(position.position, 4);
}

#[tokio::test]
async fn test_filesystem_store_writes_status_yaml() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let mut status = StatusFile::default();
    status
        .set_section(&CounterCheckpoint { number: 7 })
        .unwrap();
    store.write_status(&status).await.unwrap();

    let content = std::fs::read_to_string(tmp.path().join("status.yaml")).unwrap();
    assert_eq!(content, "counter:\n  number: 7\n");
    assert!(!tmp.path().join(".status.yaml").exists());
    assert_eq!(store.read_status().await.unwrap(), status);
}

#[tokio::test]
async fn test_read_without_document() {
    let tmp = TempDir::new().unwrap();
    let manager = CheckpointManager::filesystem(tmp.path().join("missing"));
    let counter: Option<CounterCheckpoint> = manager.read().await.unwrap();
    assert!(counter.is_none());
}

#[tokio::test]
async fn test_memory_store() {
    let manager = CheckpointManager::memory();
    manager
        .update(&CounterCheckpoint { number: 9 })
        .await
        .unwrap();
    let counter: Option<CounterCheckpoint> = manager.read().await.unwrap();
    assert_eq!(counter, Some(CounterCheckpoint { number: 9 }));
}
