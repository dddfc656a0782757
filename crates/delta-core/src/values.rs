//! Value representations for groonga-delta.
//!
//! Source rows (from MySQL or elsewhere) and generated destination records
//! share the same [`Value`] type so that expressions can pass source values
//! through untouched.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::string::FromUtf8Error;

/// Name of the identity column every destination record carries.
pub const KEY_COLUMN: &str = "_key";

/// A source row: column name to raw value.
pub type SourceRow = HashMap<String, Value>;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL / JSON null
    Null,

    /// Boolean value
    Bool(bool),

    /// Signed integer
    Int(i64),

    /// Unsigned integer
    UInt(u64),

    /// 64-bit floating point
    Float(f64),

    /// UTF-8 text
    Text(String),

    /// Raw bytes, as delivered by the MySQL protocol for text and blob columns
    Bytes(Vec<u8>),

    /// Point in time, normalized to the process local time zone
    Time(DateTime<Local>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render the value the way a template placeholder sees it.
    ///
    /// Times use `YYYY-MM-DD HH:MM:SS +HHMM` so that a `Time` typed column
    /// can parse the substituted text back without losing the offset.
    pub fn to_template_string(&self) -> Result<String, FromUtf8Error> {
        Ok(match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::UInt(u) => u.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8(b.clone())?,
            Self::Time(t) => t.format("%Y-%m-%d %H:%M:%S %z").to_string(),
        })
    }

    /// Convert to the JSON value written into `load` commands.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::UInt(u) => serde_json::Value::from(*u),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Self::Time(t) => serde_json::Value::String(format_time(t)),
        }
    }

    /// Render the value as a bare command argument (used for delete keys).
    pub fn to_argument(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Time(t) => format_time(t),
            other => other.to_json().to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Format a time as local time with nanosecond precision.
pub fn format_time(t: &DateTime<Local>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// A destination record. Field order is preserved so that serialized
/// `load` commands list columns in mapping order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The `_key` value, if the record has one.
    pub fn key(&self) -> Option<&Value> {
        self.get(KEY_COLUMN)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize as a JSON object, keeping field order.
    pub fn to_json_string(&self) -> String {
        let mut json = String::from("{");
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                json.push(',');
            }
            json.push_str(&serde_json::Value::String(name.clone()).to_string());
            json.push(':');
            json.push_str(&value.to_json().to_string());
        }
        json.push('}');
        json
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_json_keeps_field_order() {
        let mut record = Record::new();
        record.insert("_key", Value::from("shoes-1"));
        record.insert("Name", Value::from("shoes a"));
        record.insert("price", Value::Int(100));
        assert_eq!(
            record.to_json_string(),
            r#"{"_key":"shoes-1","Name":"shoes a","price":100}"#
        );
    }

    #[test]
    fn test_record_insert_replaces() {
        let mut record = Record::new();
        record.insert("a", Value::Int(1));
        record.insert("a", Value::Int(2));
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_time_json_is_local_with_fraction() {
        let t = Local.with_ymd_and_hms(2022, 1, 19, 0, 0, 1).unwrap();
        assert_eq!(
            Value::Time(t).to_json(),
            serde_json::Value::String("2022-01-19 00:00:01.000000000".to_string())
        );
    }

    #[test]
    fn test_time_keeps_nanoseconds() {
        let t = Local.with_ymd_and_hms(2022, 1, 19, 0, 0, 1).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(
            Value::Time(t).to_json(),
            serde_json::Value::String("2022-01-19 00:00:01.123456789".to_string())
        );
        assert_eq!(Value::Time(t).to_argument(), "2022-01-19 00:00:01.123456789");
    }

    #[test]
    fn test_template_string_rejects_invalid_utf8() {
        assert!(Value::Bytes(vec![0xa4, 0xa2]).to_template_string().is_err());
        assert_eq!(
            Value::Bytes("あ".as_bytes().to_vec())
                .to_template_string()
                .unwrap(),
            "あ"
        );
        assert_eq!(Value::Null.to_template_string().unwrap(), "");
    }

    #[test]
    fn test_delete_argument() {
        assert_eq!(Value::Int(29).to_argument(), "29");
        assert_eq!(Value::from("shoes-20").to_argument(), "shoes-20");
    }
}
