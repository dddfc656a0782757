use anyhow::{anyhow, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use delta_core::columnar::batch_to_rows;
use delta_core::KEY_COLUMN;
use delta_store::{Action, EntrySink};
use groonga_command::Command;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

use super::processor::CommandProcessor;

/// Replays delta entries into Groonga.
pub struct GroongaSink<'a> {
    processor: &'a CommandProcessor,
}

impl<'a> GroongaSink<'a> {
    pub fn new(processor: &'a CommandProcessor) -> Self {
        Self { processor }
    }

    async fn load_batch(&self, table: &str, batch: &RecordBatch) -> Result<()> {
        let (columns, rows) = batch_to_rows(batch)?;
        let header = serde_json::Value::Array(
            columns.into_iter().map(serde_json::Value::String).collect(),
        );
        let values: Vec<serde_json::Value> = std::iter::once(header)
            .chain(rows.into_iter().map(serde_json::Value::Array))
            .collect();
        let load = Command::new("load")
            .with("table", table)
            .with("values", serde_json::Value::Array(values).to_string());
        self.processor.execute(&load).await?;
        Ok(())
    }

    async fn delete_batch(&self, path: &Path, table: &str, batch: &RecordBatch) -> Result<()> {
        let (columns, rows) = batch_to_rows(batch)?;
        let key_index = columns
            .iter()
            .position(|column| column == KEY_COLUMN)
            .ok_or_else(|| anyhow!("{}: deletes need a {KEY_COLUMN} column", path.display()))?;
        for row in rows {
            let key = match &row[key_index] {
                serde_json::Value::String(key) => key.clone(),
                other => other.to_string(),
            };
            let delete = Command::new("delete").with("table", table).with("key", key);
            self.processor.execute(&delete).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EntrySink for GroongaSink<'_> {
    async fn apply_commands(&mut self, path: &Path, commands: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(commands);
        if let Cow::Owned(_) = text {
            warn!(
                "{}: invalid UTF-8, replacing undecodable bytes",
                path.display()
            );
        }
        self.processor.process_text(path, &text).await
    }

    async fn apply_batch(
        &mut self,
        path: &Path,
        table: &str,
        action: Action,
        batch: RecordBatch,
    ) -> Result<()> {
        debug!(
            "Applying {} rows: {action}: {}",
            batch.num_rows(),
            path.display()
        );
        match action {
            Action::Upsert => self.load_batch(table, &batch).await,
            Action::Delete => self.delete_batch(path, table, &batch).await,
        }
    }
}
