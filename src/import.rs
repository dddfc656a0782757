//! One import tick: every configured source, then the vacuumer.

use anyhow::Result;
use checkpoint::CheckpointManager;
use delta_store::{DeltaWriter, Vacuumer};
use groonga_delta_local_source::LocalSource;
use groonga_delta_mysql_source::MySQLSource;
use std::sync::Arc;
use tracing::debug;

use crate::config::ImportConfig;

pub struct Importer {
    local: Option<LocalSource>,
    mysql: Option<MySQLSource>,
    vacuumer: Vacuumer,
}

impl Importer {
    pub fn new(config: &ImportConfig, checkpoints: CheckpointManager) -> Self {
        let writer = Arc::new(DeltaWriter::new(&config.delta_dir));
        let local = config
            .local
            .clone()
            .map(|local| LocalSource::new(local, writer.clone(), checkpoints.clone()));
        let mysql = config.mysql.clone().map(|mysql| {
            MySQLSource::new(
                mysql,
                config.mapping.clone(),
                writer.clone(),
                checkpoints.clone(),
            )
        });
        let vacuumer = Vacuumer::new(&config.delta_dir, config.vacuum.keep_seconds);
        Self::from_parts(local, mysql, vacuumer)
    }

    pub fn from_parts(
        local: Option<LocalSource>,
        mysql: Option<MySQLSource>,
        vacuumer: Vacuumer,
    ) -> Self {
        Self {
            local,
            mysql,
            vacuumer,
        }
    }

    pub async fn import(&mut self) -> Result<()> {
        if self.local.is_none() && self.mysql.is_none() {
            debug!("No source is configured");
        }
        if let Some(local) = &self.local {
            local.import().await?;
        }
        if let Some(mysql) = &mut self.mysql {
            mysql.import().await?;
        }
        self.vacuumer.vacuum()
    }
}
