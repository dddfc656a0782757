//! Core types for groonga-delta.
//!
//! This crate provides the value model shared by every stage of the
//! pipeline:
//!
//! - [`Value`] - a single source or destination field value
//! - [`Record`] - an ordered destination record (always identified by `_key`)
//! - [`SourceRow`] - a source row keyed by column name
//! - [`ColumnType`] - Groonga column types and the text casting rules
//! - [`columnar`] - conversion between records and Arrow record batches
//!
//! # Architecture
//!
//! ```text
//! delta-core (this crate)
//!    │
//!    ├─── mapping        (source rows -> records / record batches)
//!    ├─── delta-store    (serializes records and batches into delta entries)
//!    └─── groonga-delta  (replays batches as load commands)
//! ```

pub mod columnar;
pub mod types;
pub mod values;

pub use types::{CastError, ColumnType, UnknownTypeError};
pub use values::{format_time, Record, SourceRow, Value, KEY_COLUMN};
