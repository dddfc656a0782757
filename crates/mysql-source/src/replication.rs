//! Binlog streaming over the replication protocol.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use mysql_async::prelude::Queryable;
use mysql_async::{BinlogStreamRequest, Conn};
use tracing::{debug, info};

use crate::event::{decode_event, BinlogBackend, BinlogEvent, BinlogStream};
use crate::ConnectionOptions;

/// Streams events as a replica with `server_id`.
///
/// A run ends once no event arrives within `idle_timeout`.
pub struct ReplicationBackend {
    options: ConnectionOptions,
    server_id: u32,
    idle_timeout: Duration,
}

impl ReplicationBackend {
    pub fn new(options: ConnectionOptions, server_id: u32, idle_timeout: Duration) -> Self {
        Self {
            options,
            server_id,
            idle_timeout,
        }
    }
}

#[async_trait]
impl BinlogBackend for ReplicationBackend {
    fn name(&self) -> &'static str {
        "replication"
    }

    async fn open(&self, file: &str, position: u64) -> Result<Box<dyn BinlogStream>> {
        let mut conn = self.options.connect().await?;
        let version = server_version(&mut conn).await?;
        if !version_at_least(&version, (5, 6)) {
            anyhow::bail!("Binlog replication needs MySQL 5.6 or later: {version}");
        }
        let request = BinlogStreamRequest::new(self.server_id)
            .with_filename(file.as_bytes())
            .with_pos(position);
        let stream = conn
            .get_binlog_stream(request)
            .await
            .with_context(|| format!("Failed to start binlog stream at {file}:{position}"))?;
        info!("Started binlog stream: {file}:{position}");
        Ok(Box::new(ReplicationStream {
            stream,
            idle_timeout: self.idle_timeout,
        }))
    }
}

struct ReplicationStream {
    stream: mysql_async::BinlogStream,
    idle_timeout: Duration,
}

#[async_trait]
impl BinlogStream for ReplicationStream {
    async fn next_event(&mut self) -> Result<Option<BinlogEvent>> {
        match tokio::time::timeout(self.idle_timeout, self.stream.next()).await {
            Ok(Some(event)) => {
                let event = event.context("Failed to read binlog event")?;
                let stream = &self.stream;
                decode_event(&event, |table_id| stream.get_tme(table_id)).map(Some)
            }
            Ok(None) => {
                debug!("Binlog stream ended");
                Ok(None)
            }
            Err(_) => {
                debug!("Binlog stream idle for {:?}", self.idle_timeout);
                Ok(None)
            }
        }
    }
}

/// Compare the leading `major.minor` of a `SELECT version()` result.
pub(crate) fn version_at_least(version: &str, required: (u32, u32)) -> bool {
    let mut parts = version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) >= required
}

pub(crate) async fn server_version(conn: &mut Conn) -> Result<String> {
    let version: Option<String> = conn.query_first("SELECT version()").await?;
    Ok(version.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("5.7.40-log", (5, 6)));
        assert!(version_at_least("8.0.33", (5, 6)));
        assert!(version_at_least("5.6.0", (5, 6)));
        assert!(!version_at_least("5.5.62", (5, 6)));
        assert!(!version_at_least("", (5, 6)));
    }
}
