//! Enumerating delta entries in timestamp order.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::COMMAND_SUFFIX;
use crate::target::{Action, DeltaTarget, EntryFormat, SchemaEntry, TableEntry};
use crate::{Timestamp, DATA_DIR, PACKED_DIR, SCHEMA_DIR};

/// How packed bundles are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Applier view. The latest bundle at or before `max` is used as the
    /// base of a full history scan; older bundles are superseded and loose
    /// entries it covers are skipped. Bundles are ignored when `min` is
    /// after the epoch.
    Replay,
    /// Vacuumer view: every bundle and loose entry in range.
    All,
}

/// Which area an area scan belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AreaKind {
    Schema,
    Table(String),
}

/// The targets of one area in timestamp order.
#[derive(Debug, Clone)]
pub struct DeltaArea {
    pub kind: AreaKind,
    pub dir: PathBuf,
    pub targets: Vec<DeltaTarget>,
}

/// Reads a delta directory.
#[derive(Debug, Clone)]
pub struct DeltaReader {
    dir: PathBuf,
}

impl DeltaReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All targets in `(min, max]` from every area, merged in timestamp
    /// order. Schema targets come first on equal timestamps.
    pub fn targets(&self, min: Timestamp, max: Timestamp) -> Result<Vec<DeltaTarget>> {
        let mut targets: Vec<DeltaTarget> = self
            .areas(min, max, Resolution::Replay)?
            .into_iter()
            .flat_map(|area| area.targets)
            .collect();
        targets.sort_by_key(DeltaTarget::timestamp);
        Ok(targets)
    }

    /// Per-area targets in `(min, max]`: the schema area, then each table
    /// area in name order.
    pub fn areas(
        &self,
        min: Timestamp,
        max: Timestamp,
        resolution: Resolution,
    ) -> Result<Vec<DeltaArea>> {
        let mut areas = Vec::new();

        let schema_dir = self.dir.join(SCHEMA_DIR);
        if schema_dir.is_dir() {
            areas.push(scan_area(AreaKind::Schema, schema_dir, min, max, resolution)?);
        }

        let data_dir = self.dir.join(DATA_DIR);
        if data_dir.is_dir() {
            for (name, path) in list_dir(&data_dir)? {
                if name.starts_with('.') || !path.is_dir() {
                    continue;
                }
                areas.push(scan_area(AreaKind::Table(name), path, min, max, resolution)?);
            }
        }

        Ok(areas)
    }
}

fn scan_area(
    kind: AreaKind,
    dir: PathBuf,
    min: Timestamp,
    max: Timestamp,
    resolution: Resolution,
) -> Result<DeltaArea> {
    let mut targets = Vec::new();
    let mut loose_min = min;

    let packed_dir = dir.join(PACKED_DIR);
    if packed_dir.is_dir() {
        let bundles = list_bundles(&packed_dir, min, max)?;
        let bundles = match resolution {
            Resolution::All => bundles,
            Resolution::Replay if min.is_epoch_or_before() => {
                bundles.into_iter().last().into_iter().collect()
            }
            Resolution::Replay => Vec::new(),
        };
        for (timestamp, path) in bundles {
            if resolution == Resolution::Replay {
                loose_min = loose_min.max(timestamp);
            }
            let members = collect_entries(&kind, &path, Timestamp::epoch(), None)?;
            targets.push(packed_target(&kind, path, timestamp, members));
        }
    }

    let mut loose = Vec::new();
    for (name, path) in list_dir(&dir)? {
        if name == PACKED_DIR || name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            let Some(day) = Timestamp::parse_day_name(&name) else {
                continue;
            };
            if day < min.date() || day > max.date() {
                continue;
            }
            loose.extend(collect_entries(&kind, &path, loose_min, Some(max))?);
        } else if let Some(target) = parse_entry(&kind, &name, path) {
            if loose_min < target.timestamp() && target.timestamp() <= max {
                loose.push(target);
            }
        }
    }
    loose.sort_by_key(DeltaTarget::timestamp);
    targets.extend(loose);

    Ok(DeltaArea {
        kind,
        dir,
        targets,
    })
}

/// Bundle directories in `(min, max]`, oldest first.
fn list_bundles(packed_dir: &Path, min: Timestamp, max: Timestamp) -> Result<Vec<(Timestamp, PathBuf)>> {
    let mut bundles = Vec::new();
    for (name, path) in list_dir(packed_dir)? {
        if !path.is_dir() {
            continue;
        }
        let Some(entry_name) = Timestamp::parse_name(&name) else {
            continue;
        };
        if entry_name.action.is_some() || !entry_name.suffix.is_empty() {
            continue;
        }
        let timestamp = entry_name.timestamp;
        if min < timestamp && timestamp <= max {
            bundles.push((timestamp, path));
        }
    }
    bundles.sort();
    Ok(bundles)
}

/// Entries directly in `dir` with timestamps in `(min, max]`, sorted.
fn collect_entries(
    kind: &AreaKind,
    dir: &Path,
    min: Timestamp,
    max: Option<Timestamp>,
) -> Result<Vec<DeltaTarget>> {
    let mut entries: Vec<DeltaTarget> = list_dir(dir)?
        .into_iter()
        .filter(|(_, path)| path.is_file())
        .filter_map(|(name, path)| parse_entry(kind, &name, path))
        .filter(|target| {
            let timestamp = target.timestamp();
            min < timestamp && max.map_or(true, |max| timestamp <= max)
        })
        .collect();
    entries.sort_by_key(DeltaTarget::timestamp);
    Ok(entries)
}

fn parse_entry(kind: &AreaKind, name: &str, path: PathBuf) -> Option<DeltaTarget> {
    let entry_name = Timestamp::parse_name(name)?;
    match kind {
        AreaKind::Schema => {
            if entry_name.action.is_some() || entry_name.suffix != COMMAND_SUFFIX {
                return None;
            }
            Some(DeltaTarget::Schema(SchemaEntry {
                path,
                timestamp: entry_name.timestamp,
            }))
        }
        AreaKind::Table(table) => {
            let action = entry_name.action?.parse::<Action>().ok()?;
            let format = EntryFormat::from_suffix(entry_name.suffix)?;
            Some(DeltaTarget::Table(TableEntry {
                path,
                timestamp: entry_name.timestamp,
                table: table.clone(),
                action,
                format,
            }))
        }
    }
}

fn packed_target(
    kind: &AreaKind,
    path: PathBuf,
    timestamp: Timestamp,
    members: Vec<DeltaTarget>,
) -> DeltaTarget {
    match kind {
        AreaKind::Schema => DeltaTarget::PackedSchema {
            path,
            timestamp,
            members: members
                .into_iter()
                .filter_map(|member| match member {
                    DeltaTarget::Schema(entry) => Some(entry),
                    _ => None,
                })
                .collect(),
        },
        AreaKind::Table(table) => DeltaTarget::PackedTable {
            path,
            timestamp,
            table: table.clone(),
            members: members
                .into_iter()
                .filter_map(|member| match member {
                    DeltaTarget::Table(entry) => Some(entry),
                    _ => None,
                })
                .collect(),
        },
    }
}

/// Directory children as `(name, path)`, sorted by name. Non UTF-8 names
/// can't be entry names and are skipped.
fn list_dir(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if let Ok(name) = entry.file_name().into_string() {
            children.push((name, entry.path()));
        }
    }
    children.sort();
    Ok(children)
}
