//! Binlog import through the `mysqlbinlog` command.
//!
//! `mysqlbinlog --read-from-remote-server --raw` copies binlog files into
//! `binlog_dir` and the copies are decoded locally. A file is fetched again
//! on every run until its successor exists locally, since the server may
//! still be appending to it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_common::binlog::consts::BinlogVersion;
use mysql_common::binlog::BinlogFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::event::{decode_event, BinlogBackend, BinlogEvent, BinlogEventKind, BinlogStream};
use crate::ConnectionOptions;

/// `mysqlbinlog` exited unsuccessfully.
#[derive(Debug, Error)]
#[error(
    "Failed to run: {command_line}\n--- output ---\n{output}--------------\n--- error ----\n{error}--------------\n"
)]
pub struct ProcessError {
    pub command_line: String,
    pub output: String,
    pub error: String,
}

pub struct MysqlbinlogBackend {
    options: ConnectionOptions,
    command: String,
    binlog_dir: PathBuf,
}

impl MysqlbinlogBackend {
    pub fn new(options: ConnectionOptions, command: impl Into<String>, binlog_dir: impl Into<PathBuf>) -> Self {
        Self {
            options,
            command: command.into(),
            binlog_dir: binlog_dir.into(),
        }
    }

    fn command_args(&self, file: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(host) = &self.options.host {
            args.push(format!("--host={host}"));
        }
        if let Some(port) = self.options.port {
            args.push(format!("--port={port}"));
        }
        if let Some(socket) = &self.options.socket {
            args.push(format!("--socket={}", socket.display()));
        }
        if let Some(user) = &self.options.user {
            args.push(format!("--user={user}"));
        }
        if let Some(password) = &self.options.password {
            args.push(format!("--password={password}"));
        }
        args.push("--read-from-remote-server".to_string());
        args.push("--raw".to_string());
        args.push(format!("--result-file={}/", self.binlog_dir.display()));
        args.push(file.to_string());
        args
    }

    async fn fetch(&self, file: &str) -> Result<()> {
        std::fs::create_dir_all(&self.binlog_dir)
            .with_context(|| format!("Failed to create {}", self.binlog_dir.display()))?;
        let args = self.command_args(file);
        let command_line = std::iter::once(self.command.as_str())
            .chain(args.iter().map(|arg| {
                if arg.starts_with("--password=") {
                    "--password=***"
                } else {
                    arg.as_str()
                }
            }))
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Running: {command_line}");
        let output = Command::new(&self.command)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to spawn: {command_line}"))?;
        if !output.status.success() {
            return Err(ProcessError {
                command_line,
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
                error: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl BinlogBackend for MysqlbinlogBackend {
    fn name(&self) -> &'static str {
        "mysqlbinlog"
    }

    async fn open(&self, file: &str, position: u64) -> Result<Box<dyn BinlogStream>> {
        let next_file = next_binlog_name(file);
        let local_path = self.binlog_dir.join(file);
        if !self.binlog_dir.join(&next_file).exists() {
            self.fetch(file).await?;
        }
        info!("Reading binlog: {}: {position}", local_path.display());
        let events = read_binlog_file(&local_path, position)?;
        Ok(Box::new(FileStream {
            events: events.into_iter(),
        }))
    }
}

/// Events of a local binlog file from `position` on.
///
/// A copied file may start with a rotate event naming itself. Only the
/// rotation to its successor is kept.
fn read_binlog_file(path: &Path, position: u64) -> Result<Vec<BinlogEvent>> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut binlog = BinlogFile::new(BinlogVersion::Version4, BufReader::new(file))
        .with_context(|| format!("Not a binlog file: {}", path.display()))?;
    let mut events = Vec::new();
    while let Some(event) = binlog.next() {
        let event = event.with_context(|| format!("Failed to read binlog: {}", path.display()))?;
        let reader = binlog.reader();
        let event = decode_event(&event, |table_id| reader.get_tme(table_id))?;
        if event.position < position {
            continue;
        }
        if matches!(&event.kind, BinlogEventKind::Rotate { file, .. } if *file == name) {
            continue;
        }
        events.push(event);
    }
    Ok(events)
}

struct FileStream {
    events: std::vec::IntoIter<BinlogEvent>,
}

#[async_trait]
impl BinlogStream for FileStream {
    async fn next_event(&mut self) -> Result<Option<BinlogEvent>> {
        Ok(self.events.next())
    }
}

/// `binlog.000009` -> `binlog.000010`
pub fn next_binlog_name(name: &str) -> String {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return format!("{name}.000001");
    }
    let (prefix, number) = name.split_at(name.len() - digits);
    let mut bytes = number.as_bytes().to_vec();
    let mut carry = true;
    for byte in bytes.iter_mut().rev() {
        if !carry {
            break;
        }
        if *byte == b'9' {
            *byte = b'0';
        } else {
            *byte += 1;
            carry = false;
        }
    }
    let mut next = String::with_capacity(name.len() + 1);
    next.push_str(prefix);
    if carry {
        next.push('1');
    }
    next.extend(bytes.into_iter().map(char::from));
    next
}
