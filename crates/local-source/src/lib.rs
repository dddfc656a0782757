//! Local command log import for groonga-delta
//!
//! Tails a directory of numbered Groonga command files (`001-schema.grn`,
//! `002-load.grn`, ...) and re-expresses each one as delta entries. Files
//! are imported in numeric order and the number of the last fully imported
//! file is the checkpoint.

mod checkpoint;
mod source;

pub use checkpoint::LocalCheckpoint;
pub use source::{LocalSource, UnsupportedError, LOAD_CHUNK_SIZE};

use std::path::PathBuf;

/// Local source settings.
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// Directory holding the numbered `.grn` files
    pub dir: PathBuf,
    /// On a cold start, files numbered above this are left for later runs
    pub initial_max_number: Option<u64>,
}
