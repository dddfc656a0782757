//! Tracing subscriber setup for the `import` and `apply` commands.

use anyhow::{anyhow, Context};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::CommonConfig;

/// `<log_dir>/groonga-delta-<command>.log`
pub fn log_path(command: &str, common: &CommonConfig) -> Option<PathBuf> {
    common
        .log_dir
        .as_ref()
        .map(|dir| dir.join(format!("groonga-delta-{command}.log")))
}

/// `RUST_LOG` wins over the configured level.
pub fn env_filter(log_level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = match log_level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "fatal" | "unknown" => "error".to_string(),
        level => level.to_string(),
    };
    EnvFilter::try_new(&level).with_context(|| format!("Invalid log_level: {log_level}"))
}

/// Install the global subscriber: a log file when `log_dir` is set,
/// stderr otherwise.
pub fn init(command: &str, common: &CommonConfig) -> anyhow::Result<()> {
    let filter = env_filter(&common.log_level)?;
    match log_path(command, common) {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {e}")),
    }
}
