//! Configuration loaded from `config.yaml` and `secret.yaml`.
//!
//! Both files live in the configuration directory (`--dir`). `secret.yaml`
//! has the same shape as `config.yaml` and carries passwords. Relative paths
//! are resolved against the configuration directory.

mod apply;
pub mod duration;
mod import;

pub use apply::{ApplyConfig, ErrorPolicy, GroongaConfig};
pub use duration::{parse_size, parse_span};
pub use import::{ImportConfig, VacuumConfig};

use anyhow::Context;
use serde_yaml::Value as Yaml;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const SECRET_FILE_NAME: &str = "secret.yaml";

const DEFAULT_DELTA_DIR: &str = "delta";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_POLLING_INTERVAL: f64 = 60.0;

/// Invalid settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Settings shared by `import` and `apply`.
#[derive(Debug, Clone)]
pub struct CommonConfig {
    pub dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub polling_interval: Duration,
}

/// The raw documents of one configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    dir: PathBuf,
    data: Yaml,
    secret: Yaml,
}

impl ConfigDocument {
    pub fn load(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        let data = read_yaml(&dir.join(CONFIG_FILE_NAME))?;
        let secret = read_yaml(&dir.join(SECRET_FILE_NAME))?;
        Ok(Self { dir, data, secret })
    }

    pub fn parse(dir: impl Into<PathBuf>, config: &str, secret: &str) -> anyhow::Result<Self> {
        Ok(Self {
            dir: dir.into(),
            data: parse_yaml(config, Path::new(CONFIG_FILE_NAME))?,
            secret: parse_yaml(secret, Path::new(SECRET_FILE_NAME))?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn data(&self) -> &Yaml {
        &self.data
    }

    pub(crate) fn secret(&self) -> &Yaml {
        &self.secret
    }

    pub(crate) fn resolve_path(&self, path: &str) -> PathBuf {
        self.dir.join(path)
    }

    pub(crate) fn common(&self) -> Result<CommonConfig, ConfigError> {
        let polling_interval = match field(&self.data, "polling_interval") {
            None => DEFAULT_POLLING_INTERVAL,
            Some(value) => seconds(value, "polling_interval")?,
        };
        let polling_interval = Duration::try_from_secs_f64(polling_interval).map_err(|_| {
            ConfigError::new(format!("invalid polling_interval: {polling_interval}"))
        })?;
        Ok(CommonConfig {
            dir: self.dir.clone(),
            log_dir: string_field(&self.data, "log_dir")?.map(|dir| self.resolve_path(&dir)),
            log_level: string_field(&self.data, "log_level")?
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            polling_interval,
        })
    }

    /// `<section>.delta_dir`, then top-level `delta_dir`, then `delta`.
    pub(crate) fn delta_dir(&self, section: Option<&str>) -> Result<PathBuf, ConfigError> {
        let nested = match section.and_then(|section| field(&self.data, section)) {
            Some(section) => string_field(section, "delta_dir")?,
            None => None,
        };
        let delta_dir = match nested {
            Some(dir) => dir,
            None => string_field(&self.data, "delta_dir")?
                .unwrap_or_else(|| DEFAULT_DELTA_DIR.to_string()),
        };
        Ok(self.resolve_path(&delta_dir))
    }
}

fn read_yaml(path: &Path) -> anyhow::Result<Yaml> {
    if !path.exists() {
        return Ok(Yaml::Mapping(Default::default()));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_yaml(&text, path)
}

fn parse_yaml(text: &str, path: &Path) -> anyhow::Result<Yaml> {
    let value: Yaml = serde_yaml::from_str(text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    match value {
        Yaml::Null => Ok(Yaml::Mapping(Default::default())),
        Yaml::Mapping(_) => Ok(value),
        _ => Err(ConfigError::new(format!("{} must be a mapping", path.display())).into()),
    }
}

/// A non-null field of a mapping.
pub(crate) fn field<'a>(section: &'a Yaml, key: &str) -> Option<&'a Yaml> {
    section.get(key).filter(|value| !value.is_null())
}

/// A scalar field as text. Numbers and booleans are accepted as written.
pub(crate) fn string_field(section: &Yaml, key: &str) -> Result<Option<String>, ConfigError> {
    match field(section, key) {
        None => Ok(None),
        Some(Yaml::String(s)) => Ok(Some(s.clone())),
        Some(Yaml::Number(n)) => Ok(Some(n.to_string())),
        Some(Yaml::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(ConfigError::new(format!(
            "{key} must be a scalar: {other:?}"
        ))),
    }
}

pub(crate) fn u64_field(section: &Yaml, key: &str) -> Result<Option<u64>, ConfigError> {
    match field(section, key) {
        None => Ok(None),
        Some(Yaml::Number(n)) if n.as_u64().is_some() => Ok(n.as_u64()),
        Some(Yaml::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::new(format!("{key} must be an integer: {s:?}"))),
        Some(other) => Err(ConfigError::new(format!(
            "{key} must be an integer: {other:?}"
        ))),
    }
}

/// A number of seconds given as a number or a numeric string.
pub(crate) fn seconds(value: &Yaml, key: &str) -> Result<f64, ConfigError> {
    let seconds = match value {
        Yaml::Number(n) => n.as_f64(),
        Yaml::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    seconds.ok_or_else(|| ConfigError::new(format!("{key} must be a number: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let document = ConfigDocument::parse("/etc/groonga-delta", "", "").unwrap();
        let common = document.common().unwrap();
        assert_eq!(common.log_dir, None);
        assert_eq!(common.log_level, "info");
        assert_eq!(common.polling_interval, Duration::from_secs(60));
        assert_eq!(
            document.delta_dir(None).unwrap(),
            PathBuf::from("/etc/groonga-delta/delta")
        );
    }

    #[test]
    fn test_common_settings() {
        let document = ConfigDocument::parse(
            "/etc/groonga-delta",
            "log_dir: log\nlog_level: debug\npolling_interval: 1.5\ndelta_dir: /var/lib/delta\n",
            "",
        )
        .unwrap();
        let common = document.common().unwrap();
        assert_eq!(common.log_dir, Some(PathBuf::from("/etc/groonga-delta/log")));
        assert_eq!(common.log_level, "debug");
        assert_eq!(common.polling_interval, Duration::from_millis(1500));
        assert_eq!(
            document.delta_dir(None).unwrap(),
            PathBuf::from("/var/lib/delta")
        );
    }

    #[test]
    fn test_nested_delta_dir_wins() {
        let document = ConfigDocument::parse(
            ".",
            "delta_dir: top\nlocal:\n  delta_dir: nested\n",
            "",
        )
        .unwrap();
        assert_eq!(
            document.delta_dir(Some("local")).unwrap(),
            PathBuf::from("./nested")
        );
        assert_eq!(document.delta_dir(None).unwrap(), PathBuf::from("./top"));
    }

    #[test]
    fn test_load_missing_files() {
        let tmp = TempDir::new().unwrap();
        let document = ConfigDocument::load(tmp.path()).unwrap();
        assert_eq!(document.dir(), tmp.path());
        assert!(document.data().as_mapping().unwrap().is_empty());
    }

    #[test]
    fn test_load_rejects_non_mapping() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "- a\n- b\n").unwrap();
        let error = ConfigDocument::load(tmp.path()).unwrap_err();
        assert!(error.downcast_ref::<ConfigError>().is_some());
    }
}
