//! Binlog events as seen by the importer.
//!
//! Both backends decode raw binlog events into [`BinlogEvent`]s. Only the
//! events the importer acts on keep their payload: rotations, table maps
//! and row changes. Row images are positional, index `i` holding the value
//! of the column with ordinal position `i + 1`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone};
use delta_core::Value;
use mysql_async::binlog::events::{Event, EventData, RowsEventData, TableMapEvent};
use mysql_async::binlog::row::BinlogRow;
use mysql_async::binlog::value::BinlogValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsKind {
    Write,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinlogEventKind {
    Rotate {
        file: String,
        position: u64,
    },
    TableMap {
        database: String,
        table: String,
    },
    /// Row images: the after image for writes and updates, the before
    /// image for deletes.
    Rows {
        kind: RowsKind,
        database: String,
        table: String,
        rows: Vec<Vec<Value>>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinlogEvent {
    /// Offset of the event in its binlog file
    pub position: u64,
    /// Offset right after the event
    pub next_position: u64,
    pub kind: BinlogEventKind,
}

/// An open binlog stream.
#[async_trait]
pub trait BinlogStream: Send {
    /// Next event, or `None` once the stream has nothing more for this run.
    async fn next_event(&mut self) -> Result<Option<BinlogEvent>>;
}

/// A way to read the source's binlog.
#[async_trait]
pub trait BinlogBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a stream starting at `file`:`position`.
    async fn open(&self, file: &str, position: u64) -> Result<Box<dyn BinlogStream>>;
}

/// Decode a raw event. `table_map` resolves table ids seen in rows events.
pub(crate) fn decode_event<'a>(
    event: &Event,
    table_map: impl Fn(u64) -> Option<&'a TableMapEvent<'static>>,
) -> Result<BinlogEvent> {
    let header = event.header();
    let next_position = u64::from(header.log_pos());
    let position = next_position.saturating_sub(u64::from(header.event_size()));
    let kind = match event.read_data()? {
        Some(EventData::RotateEvent(rotate)) => BinlogEventKind::Rotate {
            file: rotate.name().into_owned(),
            position: rotate.position(),
        },
        Some(EventData::TableMapEvent(table_map_event)) => BinlogEventKind::TableMap {
            database: table_map_event.database_name().into_owned(),
            table: table_map_event.table_name().into_owned(),
        },
        Some(EventData::RowsEvent(rows_event)) => {
            let kind = match &rows_event {
                RowsEventData::WriteRowsEventV1(_) | RowsEventData::WriteRowsEvent(_) => {
                    RowsKind::Write
                }
                RowsEventData::UpdateRowsEventV1(_)
                | RowsEventData::UpdateRowsEvent(_)
                | RowsEventData::PartialUpdateRowsEvent(_) => RowsKind::Update,
                RowsEventData::DeleteRowsEventV1(_) | RowsEventData::DeleteRowsEvent(_) => {
                    RowsKind::Delete
                }
            };
            let table_id = rows_event.table_id();
            let table_map_event = table_map(table_id).ok_or_else(|| {
                anyhow::anyhow!("Rows event at {position} refers to unknown table id {table_id}")
            })?;
            let mut rows = Vec::new();
            for row in rows_event.rows(table_map_event) {
                let (before, after) = row?;
                let image = match kind {
                    RowsKind::Delete => before,
                    RowsKind::Write | RowsKind::Update => after,
                };
                if let Some(image) = image {
                    rows.push(convert_row(&image));
                }
            }
            BinlogEventKind::Rows {
                kind,
                database: table_map_event.database_name().into_owned(),
                table: table_map_event.table_name().into_owned(),
                rows,
            }
        }
        _ => BinlogEventKind::Other,
    };
    Ok(BinlogEvent {
        position,
        next_position,
        kind,
    })
}

fn convert_row(row: &BinlogRow) -> Vec<Value> {
    (0..row.len())
        .map(|i| match row.as_ref(i) {
            Some(BinlogValue::Value(value)) => convert_value(value),
            Some(BinlogValue::Jsonb(jsonb)) => Value::Text(format!("{jsonb:?}")),
            _ => Value::Null,
        })
        .collect()
}

/// Convert a MySQL protocol value.
///
/// DATETIME and TIMESTAMP values carry no zone and are read as local time.
/// Zero dates become NULL.
pub fn convert_value(value: &mysql_async::Value) -> Value {
    use mysql_async::Value as MySQLValue;

    match value {
        MySQLValue::NULL => Value::Null,
        MySQLValue::Int(i) => Value::Int(*i),
        MySQLValue::UInt(u) => Value::UInt(*u),
        MySQLValue::Float(f) => Value::Float(f64::from(*f)),
        MySQLValue::Double(d) => Value::Float(*d),
        MySQLValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
        MySQLValue::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                })
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
                .map(Value::Time)
                .unwrap_or(Value::Null)
        }
        MySQLValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let hours = u64::from(*days) * 24 + u64::from(*hours);
            let sign = if *negative { "-" } else { "" };
            let text = if *micros == 0 {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
            };
            Value::Text(text)
        }
    }
}
