//! Replays the delta log into Groonga.
//!
//! Every run covers the entries after the `start_time` checkpoint up to the
//! moment the run began. Entries are applied in timestamp order and the
//! checkpoint moves to each entry right after it was applied, so a failed
//! or interrupted run resumes at the first entry it didn't finish.

mod processor;
mod sink;

pub use processor::{CommandProcessor, ExecutionError};
pub use sink::GroongaSink;

use anyhow::{anyhow, Result};
use checkpoint::{Checkpoint, CheckpointManager};
use delta_store::{DeltaReader, Timestamp};
use groonga_client::GroongaClient;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ErrorPolicy;

/// Timestamp of the last applied entry as `[unix_seconds, nanoseconds]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCheckpoint(pub i64, pub u32);

impl ApplyCheckpoint {
    pub fn timestamp(&self) -> Option<Timestamp> {
        Timestamp::from_unix(self.0, self.1)
    }
}

impl From<Timestamp> for ApplyCheckpoint {
    fn from(timestamp: Timestamp) -> Self {
        Self(timestamp.unix_seconds(), timestamp.subsec_nanos())
    }
}

impl Checkpoint for ApplyCheckpoint {
    const SECTION: &'static str = "start_time";

    fn to_cli_string(&self) -> String {
        match self.timestamp() {
            Some(timestamp) => timestamp.to_string(),
            None => format!("{}.{:09}", self.0, self.1),
        }
    }
}

pub struct Applier {
    reader: DeltaReader,
    checkpoints: CheckpointManager,
    processor: CommandProcessor,
}

impl Applier {
    pub fn new(
        delta_dir: impl Into<PathBuf>,
        client: Arc<dyn GroongaClient>,
        on_error: ErrorPolicy,
        checkpoints: CheckpointManager,
    ) -> Self {
        Self {
            reader: DeltaReader::new(delta_dir),
            checkpoints,
            processor: CommandProcessor::new(client, on_error),
        }
    }

    /// Apply every entry after the checkpoint up to now.
    pub async fn apply(&self) -> Result<()> {
        let start_time = match self.checkpoints.read::<ApplyCheckpoint>().await? {
            Some(checkpoint) => checkpoint.timestamp().ok_or_else(|| {
                anyhow!(
                    "Invalid {} checkpoint: {}",
                    ApplyCheckpoint::SECTION,
                    checkpoint.to_cli_string()
                )
            })?,
            None => Timestamp::epoch(),
        };
        let current_time = Timestamp::now();
        let targets = self.reader.targets(start_time, current_time)?;
        if targets.is_empty() {
            debug!("Nothing to apply: ({start_time}, {current_time}]");
            return Ok(());
        }

        info!(
            "Start applying {} targets: ({start_time}, {current_time}]",
            targets.len()
        );
        let mut sink = GroongaSink::new(&self.processor);
        for target in &targets {
            target.apply(&mut sink).await?;
            self.checkpoints
                .update(&ApplyCheckpoint::from(target.timestamp()))
                .await?;
        }
        info!("Applied {} targets", targets.len());
        Ok(())
    }
}
