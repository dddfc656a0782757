//! Retention of delta entries.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::reader::{DeltaReader, Resolution};
use crate::{Timestamp, PACKED_DIR};

/// Removes delta entries older than the retention horizon.
#[derive(Debug, Clone)]
pub struct Vacuumer {
    reader: DeltaReader,
    keep: Option<Duration>,
}

impl Vacuumer {
    /// `keep_seconds` of `None` or below zero disables vacuuming.
    pub fn new(dir: impl Into<PathBuf>, keep_seconds: Option<f64>) -> Self {
        let keep = keep_seconds
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .map(Duration::from_secs_f64);
        Self {
            reader: DeltaReader::new(dir),
            keep,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.keep.is_some()
    }

    pub fn vacuum(&self) -> Result<()> {
        let Some(keep) = self.keep else {
            return Ok(());
        };
        let Some(horizon) = Timestamp::now().checked_sub(keep) else {
            return Ok(());
        };
        self.vacuum_until(horizon)
    }

    /// Remove every entry and bundle at or before `horizon`.
    pub fn vacuum_until(&self, horizon: Timestamp) -> Result<()> {
        debug!("Vacuuming entries until {horizon}");
        for area in self
            .reader
            .areas(Timestamp::epoch(), horizon, Resolution::All)?
        {
            for target in &area.targets {
                target.vacuum()?;
            }
            remove_empty_days(&area.dir, horizon)?;
        }
        Ok(())
    }
}

/// Remove day buckets that are empty and entirely before `horizon`'s day.
fn remove_empty_days(area_dir: &Path, horizon: Timestamp) -> Result<()> {
    let entries = std::fs::read_dir(area_dir)
        .with_context(|| format!("Failed to read {}", area_dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", area_dir.display()))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name == PACKED_DIR {
            continue;
        }
        let Some(day) = Timestamp::parse_day_name(&name) else {
            continue;
        };
        if day >= horizon.date() {
            continue;
        }
        let path = entry.path();
        let is_empty = std::fs::read_dir(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?
            .next()
            .is_none();
        if is_empty {
            std::fs::remove_dir(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            info!("Vacuumed: {}", path.display());
        }
    }
    Ok(())
}
