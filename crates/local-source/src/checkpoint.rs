//! Local import checkpoint

use serde::{Deserialize, Serialize};

/// Number of the last fully imported command file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalCheckpoint {
    pub number: u64,
}

impl checkpoint::Checkpoint for LocalCheckpoint {
    const SECTION: &'static str = "local";

    fn to_cli_string(&self) -> String {
        self.number.to_string()
    }
}
