//! GroongaClient trait definition.

use anyhow::Result;
use groonga_command::Command;

use crate::Response;

/// Trait for issuing commands to Groonga.
///
/// Transport failures are errors. A command Groonga rejected is a
/// successful call returning a [`Response`] whose `is_success()` is false;
/// what to do about it is up to the caller.
///
/// # Usage Pattern
///
/// ```ignore
/// pub async fn apply<C: GroongaClient>(client: &C, command: &Command) -> Result<()> {
///     let response = client.execute(command).await?;
///     if !response.is_success() {
///         // error policy
///     }
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait GroongaClient: Send + Sync {
    /// Execute one command.
    ///
    /// For `load`, the `values` argument holds the JSON values text.
    async fn execute(&self, command: &Command) -> Result<Response>;

    /// Dump the whole database in command format.
    async fn dump(&self) -> Result<String> {
        let response = self.execute(&Command::new("dump")).await?;
        if !response.is_success() {
            anyhow::bail!(
                "dump failed: {}",
                response.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(match response.body {
            serde_json::Value::String(dump) => dump,
            other => other.to_string(),
        })
    }
}
