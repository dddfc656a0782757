//! Groonga HTTP client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use groonga_command::Command;
use reqwest::Client;
use std::time::Duration;

use crate::{GroongaClient, Response};

/// Default Groonga HTTP endpoint.
pub const DEFAULT_URL: &str = "http://127.0.0.1:10041";

/// Client for Groonga's HTTP interface.
///
/// Commands are sent as `GET /d/<name>?<arguments>`. `load` sends its
/// values as a JSON `POST` body instead of a query argument.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    url: String,
}

impl HttpClient {
    /// Create a client for `url`. `read_timeout` bounds each request.
    pub fn new(url: &str, read_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = read_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GroongaClient for HttpClient {
    async fn execute(&self, command: &Command) -> Result<Response> {
        let endpoint = format!("{}/d/{}", self.url, command.name());
        let mut arguments: Vec<(&str, &str)> = command
            .arguments()
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        let request = match (command.name(), command.get("values")) {
            ("load", Some(values)) => {
                arguments.retain(|(name, _)| *name != "values");
                self.client
                    .post(&endpoint)
                    .query(&arguments)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(values.to_string())
            }
            _ => self.client.get(&endpoint).query(&arguments),
        };

        tracing::debug!("Sending {} to {}", command.name(), endpoint);

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} to '{endpoint}'", command.name()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from '{endpoint}'"))?;

        Response::parse(&text).with_context(|| {
            format!("Groonga returned status {status} with unparsable body: {text}")
        })
    }
}
