//! Executes Groonga commands and judges their responses.

use anyhow::{Context, Result};
use groonga_client::{GroongaClient, Response};
use groonga_command::{Command, ParseEvent, Parser};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::ErrorPolicy;

/// Groonga rejected a command while `on_error` is `error`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Failed to execute: {command}: {return_code}: {message}")]
pub struct ExecutionError {
    pub command: String,
    pub return_code: i64,
    pub message: String,
}

/// Sends commands to Groonga and applies the error policy to every
/// response.
pub struct CommandProcessor {
    client: Arc<dyn GroongaClient>,
    on_error: ErrorPolicy,
}

impl CommandProcessor {
    pub fn new(client: Arc<dyn GroongaClient>, on_error: ErrorPolicy) -> Self {
        Self { client, on_error }
    }

    pub fn on_error(&self) -> ErrorPolicy {
        self.on_error
    }

    pub async fn execute(&self, command: &Command) -> Result<Response> {
        let response = self
            .client
            .execute(command)
            .await
            .with_context(|| format!("Failed to send: {}", command.name()))?;
        self.process_response(&response, command)?;
        Ok(response)
    }

    /// Log a failed response, and fail under `on_error: error`.
    pub fn process_response(&self, response: &Response, command: &Command) -> Result<()> {
        if response.is_success() {
            debug!(
                "Executed: {}: {:.6}s",
                command.name(),
                response.elapsed
            );
            return Ok(());
        }

        let message = response.error_message.clone().unwrap_or_default();
        match self.on_error {
            ErrorPolicy::Ignore => {
                debug!(
                    "Ignored failure: {}: {}: {message}",
                    command.name(),
                    response.return_code
                );
                Ok(())
            }
            ErrorPolicy::Warning => {
                warn!(
                    "Failed to execute: {}: {}: {message}",
                    summarize(command),
                    response.return_code
                );
                Ok(())
            }
            ErrorPolicy::Error => {
                let error = ExecutionError {
                    command: summarize(command),
                    return_code: response.return_code,
                    message,
                };
                error!("{error}");
                Err(error.into())
            }
        }
    }

    /// Replay a command log read from `path`.
    pub async fn process_text(&self, path: &Path, text: &str) -> Result<()> {
        let mut parser = Parser::new();
        let mut events = parser
            .feed(text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        events.extend(
            parser
                .finish()
                .with_context(|| format!("Failed to parse {}", path.display()))?,
        );

        let mut values = Vec::new();
        for event in events {
            match event {
                ParseEvent::Command(command) => {
                    self.execute(&command).await?;
                }
                ParseEvent::LoadStart(_) | ParseEvent::LoadColumns(_) => {}
                ParseEvent::LoadValue(value) => values.push(value),
                ParseEvent::LoadComplete(mut command) => {
                    if command.get("values").is_none() {
                        let array = serde_json::Value::Array(std::mem::take(&mut values));
                        command.set("values", array.to_string());
                    }
                    self.execute(&command).await?;
                }
            }
        }
        Ok(())
    }
}

/// The command without its (possibly huge) `values`.
fn summarize(command: &Command) -> String {
    let mut command = command.clone();
    if let Some(values) = command.get("values") {
        if values.len() > 80 {
            let size = values.len();
            command.set("values", format!("...({size} bytes)"));
        }
    }
    command.to_command_format()
}

#[cfg(test)]
mod tests {
    use super::*;
    use groonga_client::testing::MemoryGroonga;

    const SCHEMA: &str = "table_create Items TABLE_HASH_KEY ShortText\n\
                          column_create Items name COLUMN_SCALAR ShortText\n";

    fn processor(on_error: ErrorPolicy) -> (Arc<MemoryGroonga>, CommandProcessor) {
        let groonga = Arc::new(MemoryGroonga::new());
        let processor = CommandProcessor::new(groonga.clone(), on_error);
        (groonga, processor)
    }

    #[tokio::test]
    async fn test_process_text_assembles_loads() {
        let (groonga, processor) = processor(ErrorPolicy::Error);
        let text = format!(
            "{SCHEMA}load --table Items\n[\n[\"_key\",\"name\"],\n[\"a\",\"Apple\"],\n[\"b\",\"Banana\"]\n]\n"
        );
        processor
            .process_text(Path::new("items.grn"), &text)
            .await
            .unwrap();

        assert_eq!(groonga.n_records("Items").await, Some(2));
        let executed = groonga.executed().await;
        let load = executed.last().unwrap();
        assert_eq!(load.name(), "load");
        assert_eq!(load.get("columns"), Some("_key,name"));
        assert_eq!(load.get("values"), Some(r#"[["a","Apple"],["b","Banana"]]"#));
    }

    #[tokio::test]
    async fn test_process_text_inline_values() {
        let (groonga, processor) = processor(ErrorPolicy::Error);
        let text = format!("{SCHEMA}load --table Items --values '[{{\"_key\":\"a\"}}]'");
        processor
            .process_text(Path::new("items.grn"), &text)
            .await
            .unwrap();
        assert_eq!(groonga.n_records("Items").await, Some(1));
    }

    #[tokio::test]
    async fn test_error_policy_error() {
        let (_groonga, processor) = processor(ErrorPolicy::Error);
        let error = processor
            .process_text(Path::new("bad.grn"), "delete --table Nonexistent --key a\n")
            .await
            .unwrap_err();
        let error = error.downcast_ref::<ExecutionError>().unwrap();
        assert_eq!(
            error.command,
            r#"delete --key "a" --table "Nonexistent""#
        );
        assert_ne!(error.return_code, 0);
    }

    #[tokio::test]
    async fn test_error_policy_continues() {
        for on_error in [ErrorPolicy::Ignore, ErrorPolicy::Warning] {
            let (groonga, processor) = processor(on_error);
            let text = format!("delete --table Nonexistent --key a\n{SCHEMA}");
            processor
                .process_text(Path::new("mixed.grn"), &text)
                .await
                .unwrap();
            assert_eq!(groonga.n_records("Items").await, Some(0));
        }
    }

    #[test]
    fn test_summarize_elides_large_values() {
        let values = format!("[{}]", vec!["1"; 100].join(","));
        let command = Command::new("load").with("table", "Items").with("values", values);
        assert_eq!(
            summarize(&command),
            r#"load --table "Items" --values "...(201 bytes)""#
        );
    }
}
