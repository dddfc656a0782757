//! groonga-delta
//!
//! Replicates changes into Groonga through a delta log.
//!
//! - `import` reads sources (a MySQL binlog, a local Groonga command log)
//!   and writes their changes to the delta log
//! - `apply` replays the delta log into Groonga in timestamp order
//!
//! Both keep their progress in `status.yaml` next to the configuration, so
//! every run resumes where the last one stopped.
//!
//! # Crates
//!
//! - `delta_store` - delta log format, writer, reader and vacuumer
//! - `mapping` - source row to Groonga record generation
//! - `groonga_delta_mysql_source` - MySQL binlog importer
//! - `groonga_delta_local_source` - Groonga command log importer
//! - `groonga_client` - Groonga client used by `apply`
//!
//! # CLI Usage
//!
//! ```bash
//! # Import once
//! groonga-delta import --dir /etc/groonga-delta
//!
//! # Apply continuously
//! groonga-delta apply --dir /etc/groonga-delta --server
//! ```

pub mod apply;
pub mod config;
pub mod import;
pub mod logging;
pub mod runner;

pub use apply::{Applier, ApplyCheckpoint, CommandProcessor, ExecutionError};
pub use config::{ApplyConfig, ConfigError, ErrorPolicy, ImportConfig};
pub use import::Importer;
pub use runner::{run, setup_shutdown_handler, Process};
