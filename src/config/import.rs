use groonga_delta_local_source::LocalConfig;
use groonga_delta_mysql_source::{
    BackendKind, ConnectionOptions, MySQLConfig, BACKEND_ENV, DEFAULT_INITIAL_IMPORT_BATCH_SIZE,
    DEFAULT_SERVER_ID,
};
use mapping::Mapping;
use serde_yaml::Value as Yaml;
use std::path::PathBuf;
use std::time::Duration;

use super::{
    field, parse_size, parse_span, seconds, string_field, u64_field, CommonConfig,
    ConfigDocument, ConfigError,
};

const DEFAULT_MYSQL_HOST: &str = "localhost";
const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_BINLOG_DIR: &str = "binlog";
const DEFAULT_MYSQLBINLOG: &str = "mysqlbinlog";
const DEFAULT_LOCAL_DIR: &str = "local";

/// Retention of delta entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VacuumConfig {
    /// `None` keeps everything
    pub keep_seconds: Option<f64>,
}

/// Configuration of `groonga-delta import`.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub common: CommonConfig,
    pub delta_dir: PathBuf,
    /// `None` when the `mysql` section is absent
    pub mysql: Option<MySQLConfig>,
    /// `None` when the `local` section is absent
    pub local: Option<LocalConfig>,
    pub vacuum: VacuumConfig,
    pub mapping: Mapping,
}

impl ImportConfig {
    pub fn load(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Self::from_document(&ConfigDocument::load(dir)?)
    }

    pub fn from_document(document: &ConfigDocument) -> anyhow::Result<Self> {
        let common = document.common()?;
        let mysql = match field(document.data(), "mysql") {
            Some(data) => {
                let secret = field(document.secret(), "mysql").unwrap_or(&Yaml::Null);
                let backend = std::env::var(BACKEND_ENV).ok();
                Some(mysql_config(
                    document,
                    data,
                    secret,
                    backend.as_deref(),
                    common.polling_interval,
                )?)
            }
            None => None,
        };
        let local = match field(document.data(), "local") {
            Some(data) => Some(local_config(document, data)?),
            None => None,
        };
        let vacuum = match field(document.data(), "vacuum") {
            Some(data) => vacuum_config(data)?,
            None => VacuumConfig::default(),
        };
        let mapping = match field(document.data(), "mapping") {
            Some(data) => Mapping::parse(data)?,
            None => Mapping::default(),
        };
        Ok(Self {
            delta_dir: document.delta_dir(None)?,
            common,
            mysql,
            local,
            vacuum,
            mapping,
        })
    }
}

fn mysql_config(
    document: &ConfigDocument,
    data: &Yaml,
    secret: &Yaml,
    backend_override: Option<&str>,
    idle_timeout: Duration,
) -> Result<MySQLConfig, ConfigError> {
    let port = match u64_field(data, "port")? {
        None => DEFAULT_MYSQL_PORT,
        Some(port) => u16::try_from(port)
            .map_err(|_| ConfigError::new(format!("invalid MySQL port: {port}")))?,
    };
    let base = ConnectionOptions {
        host: Some(string_field(data, "host")?.unwrap_or_else(|| DEFAULT_MYSQL_HOST.to_string())),
        port: Some(port),
        socket: string_field(data, "socket")?.map(PathBuf::from),
        user: string_field(data, "user")?,
        password: match string_field(secret, "password")? {
            Some(password) => Some(password),
            None => string_field(data, "password")?,
        },
    };
    let role = |name: &str| -> Result<ConnectionOptions, ConfigError> {
        let role_data = field(data, name);
        let role_secret = field(secret, name);
        let user = match role_data {
            Some(role_data) => string_field(role_data, "user")?,
            None => None,
        };
        let mut password = match role_secret {
            Some(role_secret) => string_field(role_secret, "password")?,
            None => None,
        };
        if password.is_none() {
            if let Some(role_data) = role_data {
                password = string_field(role_data, "password")?;
            }
        }
        Ok(ConnectionOptions {
            user: user.or_else(|| base.user.clone()),
            password: password.or_else(|| base.password.clone()),
            ..base.clone()
        })
    };

    let initial_import_batch_size = match field(data, "initial_import_batch_size") {
        None => DEFAULT_INITIAL_IMPORT_BATCH_SIZE,
        Some(Yaml::Number(n)) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ConfigError::new(format!("invalid size value: {n}")))?,
        Some(Yaml::String(s)) => parse_size(s)?,
        Some(other) => {
            return Err(ConfigError::new(format!("invalid size value: {other:?}")));
        }
    };

    let backend = match backend_override {
        Some(backend) => Some(backend.to_string()),
        None => string_field(data, "backend")?,
    };
    let backend = match backend {
        Some(backend) => backend.parse::<BackendKind>().map_err(ConfigError::new)?,
        None => BackendKind::default(),
    };

    let server_id = match u64_field(data, "server_id")? {
        None => DEFAULT_SERVER_ID,
        Some(id) => u32::try_from(id)
            .map_err(|_| ConfigError::new(format!("invalid server_id: {id}")))?,
    };

    // Both backends read the checksum algorithm from the binlog itself.
    if let Some(checksum) = string_field(data, "checksum")? {
        tracing::debug!("Ignoring configured binlog checksum: {checksum}");
    }

    Ok(MySQLConfig {
        replication_client: role("replication_client")?,
        replication_slave: role("replication_slave")?,
        select: role("select")?,
        initial_import_batch_size,
        backend,
        binlog_dir: document.resolve_path(
            &string_field(data, "binlog_dir")?.unwrap_or_else(|| DEFAULT_BINLOG_DIR.to_string()),
        ),
        mysqlbinlog: string_field(data, "mysqlbinlog")?
            .unwrap_or_else(|| DEFAULT_MYSQLBINLOG.to_string()),
        server_id,
        idle_timeout,
    })
}

fn local_config(document: &ConfigDocument, data: &Yaml) -> Result<LocalConfig, ConfigError> {
    let dir = string_field(data, "dir")?.unwrap_or_else(|| DEFAULT_LOCAL_DIR.to_string());
    Ok(LocalConfig {
        dir: document.resolve_path(&dir),
        initial_max_number: u64_field(data, "initial_max_number")?,
    })
}

fn vacuum_config(data: &Yaml) -> Result<VacuumConfig, ConfigError> {
    let keep_seconds = match (field(data, "keep_seconds"), field(data, "keep_span")) {
        (Some(value), _) => Some(seconds(value, "keep_seconds")?),
        (None, Some(Yaml::String(span))) => Some(parse_span(span)?),
        (None, Some(value)) => Some(seconds(value, "keep_span")?),
        (None, None) => None,
    };
    Ok(VacuumConfig { keep_seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(config: &str, secret: &str) -> ConfigDocument {
        ConfigDocument::parse("/etc/groonga-delta", config, secret).unwrap()
    }

    fn mysql(config: &str, secret: &str, backend: Option<&str>) -> Result<MySQLConfig, ConfigError> {
        let document = document(config, secret);
        let data = field(document.data(), "mysql").unwrap().clone();
        let secret = field(document.secret(), "mysql").cloned().unwrap_or(Yaml::Null);
        mysql_config(&document, &data, &secret, backend, Duration::from_secs(60))
    }

    #[test]
    fn test_sections_are_optional() {
        let config = ImportConfig::from_document(&document("", "")).unwrap();
        assert!(config.mysql.is_none());
        assert!(config.local.is_none());
        assert_eq!(config.vacuum.keep_seconds, None);
        assert!(config.mapping.is_empty());
        assert_eq!(config.delta_dir, PathBuf::from("/etc/groonga-delta/delta"));
    }

    #[test]
    fn test_mysql_defaults() {
        let config = mysql("mysql:\n  user: replicator\n", "", None).unwrap();
        assert_eq!(config.replication_slave.host.as_deref(), Some("localhost"));
        assert_eq!(config.replication_slave.port, Some(3306));
        assert_eq!(config.select.user.as_deref(), Some("replicator"));
        assert_eq!(config.initial_import_batch_size, 1024 * 1024);
        assert_eq!(config.backend, BackendKind::Replication);
        assert_eq!(config.binlog_dir, PathBuf::from("/etc/groonga-delta/binlog"));
        assert_eq!(config.mysqlbinlog, "mysqlbinlog");
        assert_eq!(config.server_id, 1001);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_mysql_roles() {
        let config = mysql(
            "mysql:\n  user: default\n  password: plain\n  select:\n    user: reader\n  replication_client:\n    user: locker\n    password: role-plain\n",
            "mysql:\n  password: secret\n  replication_slave:\n    password: slave-secret\n",
            None,
        )
        .unwrap();
        assert_eq!(config.select.user.as_deref(), Some("reader"));
        assert_eq!(config.select.password.as_deref(), Some("secret"));
        assert_eq!(config.replication_client.user.as_deref(), Some("locker"));
        assert_eq!(
            config.replication_client.password.as_deref(),
            Some("role-plain")
        );
        assert_eq!(config.replication_slave.user.as_deref(), Some("default"));
        assert_eq!(
            config.replication_slave.password.as_deref(),
            Some("slave-secret")
        );
    }

    #[test]
    fn test_initial_import_batch_size() {
        let size = |value: &str| {
            mysql(&format!("mysql:\n  initial_import_batch_size: {value}\n"), "", None)
                .map(|config| config.initial_import_batch_size)
        };
        assert_eq!(size("4096"), Ok(4096));
        assert_eq!(size("512k"), Ok(512 * 1024));
        assert_eq!(size("2M"), Ok(2 * 1024 * 1024));
        assert_eq!(
            size("512X").unwrap_err().to_string(),
            r#"invalid size value: "512X""#
        );
    }

    #[test]
    fn test_backend() {
        let config = mysql("mysql:\n  backend: mysqlbinlog\n", "", None).unwrap();
        assert_eq!(config.backend, BackendKind::Mysqlbinlog);

        let config = mysql("mysql:\n  backend: mysqlbinlog\n", "", Some("replication")).unwrap();
        assert_eq!(config.backend, BackendKind::Replication);

        assert!(mysql("mysql:\n  backend: binlog\n", "", None).is_err());
    }

    #[test]
    fn test_local() {
        let config = ImportConfig::from_document(&document(
            "local:\n  initial_max_number: 9\n",
            "",
        ))
        .unwrap();
        let local = config.local.unwrap();
        assert_eq!(local.dir, PathBuf::from("/etc/groonga-delta/local"));
        assert_eq!(local.initial_max_number, Some(9));

        let config = ImportConfig::from_document(&document("local:\n  dir: /var/log/grn\n", ""))
            .unwrap();
        let local = config.local.unwrap();
        assert_eq!(local.dir, PathBuf::from("/var/log/grn"));
        assert_eq!(local.initial_max_number, None);
    }

    #[test]
    fn test_vacuum() {
        let keep = |config: &str| {
            ImportConfig::from_document(&document(config, ""))
                .map(|config| config.vacuum.keep_seconds)
        };
        assert_eq!(keep("vacuum:\n  keep_seconds: 30\n").unwrap(), Some(30.0));
        assert_eq!(keep("vacuum:\n  keep_span: 1.1\n").unwrap(), Some(1.1));
        assert_eq!(
            keep("vacuum:\n  keep_span: 2days\n").unwrap(),
            Some(2.0 * 60.0 * 60.0 * 24.0)
        );
        let error = keep("vacuum:\n  keep_span: 1X\n").unwrap_err();
        assert_eq!(
            error.downcast_ref::<ConfigError>().map(|e| e.to_string()),
            Some(r#"invalid span value: "1X""#.to_string())
        );
    }
}
