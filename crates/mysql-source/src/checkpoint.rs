//! MySQL binlog checkpoint
//!
//! The checkpoint records two binlog coordinates:
//!
//! - `last_file` / `last_position`: the end of the last imported rows event
//! - `last_table_map_file` / `last_table_map_position`: the table map event
//!   preceding it, where the stream is reopened so that the rows events
//!   after it can be decoded again
//!
//! Older status files spelled `last_file` as `file` and `last_position` as
//! `position`. Both spellings are accepted on read.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawMySQLCheckpoint")]
pub struct MySQLCheckpoint {
    pub last_file: String,
    pub last_position: u64,
    pub last_table_map_file: String,
    pub last_table_map_position: u64,
}

impl MySQLCheckpoint {
    /// Checkpoint right after a snapshot taken at `file`:`position`.
    pub fn at(file: impl Into<String>, position: u64) -> Self {
        let file = file.into();
        Self {
            last_file: file.clone(),
            last_position: position,
            last_table_map_file: file,
            last_table_map_position: position,
        }
    }
}

impl checkpoint::Checkpoint for MySQLCheckpoint {
    const SECTION: &'static str = "mysql";

    fn to_cli_string(&self) -> String {
        format!("{}:{}", self.last_file, self.last_position)
    }
}

#[derive(Deserialize)]
struct RawMySQLCheckpoint {
    file: Option<String>,
    position: Option<u64>,
    last_file: Option<String>,
    last_position: Option<u64>,
    last_table_map_file: Option<String>,
    last_table_map_position: Option<u64>,
}

impl TryFrom<RawMySQLCheckpoint> for MySQLCheckpoint {
    type Error = String;

    fn try_from(raw: RawMySQLCheckpoint) -> Result<Self, Self::Error> {
        let last_file = raw
            .last_file
            .or(raw.file)
            .ok_or_else(|| "mysql status has no last_file".to_string())?;
        let last_position = raw
            .last_position
            .or(raw.position)
            .ok_or_else(|| "mysql status has no last_position".to_string())?;
        let last_table_map_file = raw
            .last_table_map_file
            .unwrap_or_else(|| last_file.clone());
        let last_table_map_position = raw.last_table_map_position.unwrap_or(last_position);
        Ok(Self {
            last_file,
            last_position,
            last_table_map_file,
            last_table_map_position,
        })
    }
}
