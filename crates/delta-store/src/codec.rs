//! Parquet encoding for columnar delta entries.

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;

pub const PARQUET_SUFFIX: &str = ".parquet";
pub const COMMAND_SUFFIX: &str = ".grn";

pub fn write_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .with_context(|| format!("Parquet writer error: {}", path.display()))?;
    writer
        .write(batch)
        .with_context(|| format!("Parquet write error: {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("Parquet close error: {}", path.display()))?;
    Ok(())
}

pub fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Parquet reader error: {}", path.display()))?
        .build()
        .with_context(|| format!("Parquet reader build error: {}", path.display()))?;
    reader
        .map(|batch| batch.with_context(|| format!("Parquet read error: {}", path.display())))
        .collect()
}
