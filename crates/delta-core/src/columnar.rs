//! Conversion between records and Arrow record batches.
//!
//! Bulk imports write one column per mapping column. The Arrow type comes
//! from the declared column type, or from the first non-null value when the
//! column is untyped. A column whose values do not all fit that type falls
//! back to UTF-8 so that no value is lost. Times outside the nanosecond
//! timestamp range (1677 to 2262) don't fit `Time`.

use crate::types::ColumnType;
use crate::values::{format_time, Record, Value};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, StringArray, TimestampNanosecondArray, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{Local, TimeZone};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Int,
    UInt,
    Float,
    Bool,
    Time,
}

impl Kind {
    fn declared(column_type: ColumnType) -> Self {
        match column_type {
            t if t.is_signed_integer() => Kind::Int,
            t if t.is_unsigned_integer() => Kind::UInt,
            ColumnType::Float => Kind::Float,
            ColumnType::Bool => Kind::Bool,
            ColumnType::Time => Kind::Time,
            _ => Kind::Text,
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Kind::Bool),
            Value::Int(_) => Some(Kind::Int),
            Value::UInt(_) => Some(Kind::UInt),
            Value::Float(_) => Some(Kind::Float),
            Value::Text(_) | Value::Bytes(_) => Some(Kind::Text),
            Value::Time(_) => Some(Kind::Time),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Kind::Text, _) => true,
            (Kind::Float, Value::Int(_) | Value::UInt(_)) => true,
            (Kind::Time, Value::Time(t)) => t.timestamp_nanos_opt().is_some(),
            (kind, value) => Kind::of(value) == Some(*kind),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            Kind::Text => DataType::Utf8,
            Kind::Int => DataType::Int64,
            Kind::UInt => DataType::UInt64,
            Kind::Float => DataType::Float64,
            Kind::Bool => DataType::Boolean,
            Kind::Time => DataType::Timestamp(TimeUnit::Nanosecond, None),
        }
    }
}

/// Build a record batch with one column per `(name, declared type)` entry.
pub fn records_to_batch(
    columns: &[(String, Option<ColumnType>)],
    records: &[Record],
) -> Result<RecordBatch, ArrowError> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

    for (name, column_type) in columns {
        let values: Vec<&Value> = records
            .iter()
            .map(|record| record.get(name).unwrap_or(&Value::Null))
            .collect();
        let kind = column_type
            .map(Kind::declared)
            .or_else(|| values.iter().find_map(|v| Kind::of(v)))
            .unwrap_or(Kind::Text);
        let kind = if values.iter().all(|v| kind.accepts(v)) {
            kind
        } else {
            Kind::Text
        };
        fields.push(Field::new(name, kind.data_type(), true));
        arrays.push(build_array(kind, &values));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
}

fn build_array(kind: Kind, values: &[&Value]) -> ArrayRef {
    match kind {
        Kind::Text => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    other => Some(other.to_argument()),
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Int => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::UInt => Arc::new(UInt64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::UInt(u) => Some(*u),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Float => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    Value::Int(i) => Some(*i as f64),
                    Value::UInt(u) => Some(*u as f64),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Bool => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        Kind::Time => Arc::new(TimestampNanosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Time(t) => t.timestamp_nanos_opt(),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Flatten a record batch into a column header and JSON rows, the shape a
/// Groonga `load` command takes for array values.
pub fn batch_to_rows(
    batch: &RecordBatch,
) -> Result<(Vec<String>, Vec<Vec<serde_json::Value>>), ArrowError> {
    let schema = batch.schema();
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let mut rows = vec![Vec::with_capacity(columns.len()); batch.num_rows()];

    for array in batch.columns() {
        for (row_index, row) in rows.iter_mut().enumerate() {
            row.push(json_at(array.as_ref(), row_index)?);
        }
    }

    Ok((columns, rows))
}

fn json_at(array: &dyn Array, index: usize) -> Result<serde_json::Value, ArrowError> {
    if array.is_null(index) {
        return Ok(serde_json::Value::Null);
    }
    macro_rules! downcast {
        ($ty:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .ok_or_else(|| {
                    ArrowError::CastError(format!("unexpected array for {}", array.data_type()))
                })?
                .value(index)
        };
    }
    Ok(match array.data_type() {
        DataType::Utf8 => serde_json::Value::from(downcast!(StringArray)),
        DataType::LargeUtf8 => serde_json::Value::from(downcast!(LargeStringArray)),
        DataType::Int32 => serde_json::Value::from(downcast!(Int32Array)),
        DataType::Int64 => serde_json::Value::from(downcast!(Int64Array)),
        DataType::UInt32 => serde_json::Value::from(downcast!(UInt32Array)),
        DataType::UInt64 => serde_json::Value::from(downcast!(UInt64Array)),
        DataType::Float32 => serde_json::Value::from(downcast!(Float32Array) as f64),
        DataType::Float64 => serde_json::Value::from(downcast!(Float64Array)),
        DataType::Boolean => serde_json::Value::from(downcast!(BooleanArray)),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            let nanos = downcast!(TimestampNanosecondArray);
            serde_json::Value::from(format_time(&Local.timestamp_nanos(nanos)))
        }
        other => {
            return Err(ArrowError::NotYetImplemented(format!(
                "unsupported column type in delta entry: {other}"
            )))
        }
    })
}
