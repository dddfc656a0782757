//! MySQL binlog import for groonga-delta
//!
//! The first run takes a consistent snapshot of every mapped table and
//! writes it as one packed bundle per destination table. Later runs follow
//! the binlog from the checkpoint and write a loose entry per rows event.
//!
//! The binlog is read either as a replica over the replication protocol or
//! through `mysqlbinlog`, see [`BackendKind`].

mod checkpoint;
mod client;
mod event;
mod mysqlbinlog;
mod replication;
mod source;
pub mod testing;

#[cfg(test)]
mod tests;

pub use checkpoint::MySQLCheckpoint;
pub use client::{ColumnInfo, MySQLClient, Snapshot, SourceClient};
pub use event::{convert_value, BinlogBackend, BinlogEvent, BinlogEventKind, BinlogStream, RowsKind};
pub use mysqlbinlog::{next_binlog_name, MysqlbinlogBackend, ProcessError};
pub use replication::ReplicationBackend;
pub use source::MySQLSource;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use mysql_async::{Conn, OptsBuilder};

/// Environment variable overriding the configured backend.
pub const BACKEND_ENV: &str = "GROONGA_DELTA_IMPORT_MYSQL_SOURCE_BACKEND";

pub const DEFAULT_INITIAL_IMPORT_BATCH_SIZE: usize = 1024 * 1024;
pub const DEFAULT_SERVER_ID: u32 = 1001;

/// Connection settings for one MySQL role.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<PathBuf>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("socket", &self.socket)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ConnectionOptions {
    fn endpoint(&self) -> String {
        match (&self.socket, &self.host) {
            (Some(socket), _) => socket.display().to_string(),
            (None, Some(host)) => format!("{host}:{}", self.port.unwrap_or(3306)),
            (None, None) => format!("localhost:{}", self.port.unwrap_or(3306)),
        }
    }

    pub async fn connect(&self) -> anyhow::Result<Conn> {
        let mut opts = OptsBuilder::default()
            .user(self.user.clone())
            .pass(self.password.clone());
        if let Some(host) = &self.host {
            opts = opts.ip_or_hostname(host.clone());
        }
        if let Some(port) = self.port {
            opts = opts.tcp_port(port);
        }
        if let Some(socket) = &self.socket {
            opts = opts.socket(Some(socket.display().to_string()));
        }
        Conn::new(opts)
            .await
            .with_context(|| format!("Failed to connect to MySQL at '{}'", self.endpoint()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Replication,
    Mysqlbinlog,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replication" | "mysql2-replication" => Ok(Self::Replication),
            "mysqlbinlog" => Ok(Self::Mysqlbinlog),
            other => Err(format!("unknown MySQL source backend: {other}")),
        }
    }
}

/// MySQL source settings.
#[derive(Debug, Clone)]
pub struct MySQLConfig {
    /// Takes the global read lock and reads the binlog position
    pub replication_client: ConnectionOptions,
    /// Streams the binlog
    pub replication_slave: ConnectionOptions,
    /// Reads existing rows and table metadata
    pub select: ConnectionOptions,
    /// Approximate bytes of source rows per initial import batch
    pub initial_import_batch_size: usize,
    pub backend: BackendKind,
    /// Local copies of binlog files for the `mysqlbinlog` backend
    pub binlog_dir: PathBuf,
    pub mysqlbinlog: String,
    pub server_id: u32,
    /// A replication run ends after this long without an event
    pub idle_timeout: Duration,
}
