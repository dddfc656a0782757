use serde_yaml::Value as Yaml;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::{field, seconds, string_field, CommonConfig, ConfigDocument, ConfigError};

const DEFAULT_GROONGA_URL: &str = "http://127.0.0.1:10041";

/// What to do when Groonga rejects a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    Ignore,
    Warning,
    #[default]
    Error,
}

impl FromStr for ErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::new(format!(
                "on_error must be ignore, warning or error: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignore => "ignore",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroongaConfig {
    pub url: String,
    pub read_timeout: Option<Duration>,
}

/// Configuration of `groonga-delta apply`.
#[derive(Debug, Clone)]
pub struct ApplyConfig {
    pub common: CommonConfig,
    pub delta_dir: PathBuf,
    pub on_error: ErrorPolicy,
    pub groonga: GroongaConfig,
}

impl ApplyConfig {
    pub fn load(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Self::from_document(&ConfigDocument::load(dir)?)
    }

    pub fn from_document(document: &ConfigDocument) -> anyhow::Result<Self> {
        let on_error = match string_field(document.data(), "on_error")? {
            Some(on_error) => on_error.parse()?,
            None => ErrorPolicy::default(),
        };
        let groonga = match field(document.data(), "groonga") {
            Some(data) => groonga_config(data)?,
            None => groonga_config(&Yaml::Null)?,
        };
        Ok(Self {
            common: document.common()?,
            delta_dir: document.delta_dir(Some("local"))?,
            on_error,
            groonga,
        })
    }
}

fn groonga_config(data: &Yaml) -> Result<GroongaConfig, ConfigError> {
    let read_timeout = match field(data, "read_timeout") {
        None => None,
        Some(value) => {
            let read_timeout = seconds(value, "read_timeout")?;
            // A negative timeout waits forever.
            if read_timeout < 0.0 {
                None
            } else {
                Some(Duration::try_from_secs_f64(read_timeout).map_err(|_| {
                    ConfigError::new(format!("invalid read_timeout: {read_timeout}"))
                })?)
            }
        }
    };
    Ok(GroongaConfig {
        url: string_field(data, "url")?.unwrap_or_else(|| DEFAULT_GROONGA_URL.to_string()),
        read_timeout,
    })
}
