//! The delta log: a directory of immutable, timestamp named entries.
//!
//! ```text
//! <delta_dir>/
//!   schema/
//!     packed/<ts>/<ts>.grn          bootstrap bundles
//!     <YYYY-MM-DD>/<ts>.grn         schema commands
//!   data/<table>/
//!     packed/<ts>/<ts>-upsert.parquet
//!     <YYYY-MM-DD>/<ts>-upsert.grn  load commands
//!     <YYYY-MM-DD>/<ts>-delete.grn  delete commands
//! ```
//!
//! Entries are published by rename, so readers never see partial files.
//! The day directories only spread entries over the filesystem; ordering
//! is decided by the timestamp in each name.
//!
//! - [`DeltaWriter`] publishes entries and packed bundles
//! - [`DeltaReader`] lists them as [`DeltaTarget`]s in timestamp order
//! - [`Vacuumer`] removes entries past the retention horizon

pub mod codec;
mod reader;
mod target;
mod timestamp;
mod vacuumer;
mod writer;


pub use reader::{AreaKind, DeltaArea, DeltaReader, Resolution};
pub use target::{Action, DeltaTarget, EntryFormat, EntrySink, SchemaEntry, TableEntry};
pub use timestamp::{EntryName, Timestamp, TIMESTAMP_NAME_LENGTH};
pub use vacuumer::Vacuumer;
pub use writer::{DeltaWriter, PackedBundle, Upserts};

/// Schema area directory name.
pub const SCHEMA_DIR: &str = "schema";
/// Parent of the per-table data areas.
pub const DATA_DIR: &str = "data";
/// Directory holding packed bundles inside an area.
pub const PACKED_DIR: &str = "packed";
