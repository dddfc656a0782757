//! Groonga column types and the rules for casting generated text into them.

use crate::values::Value;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt;
use std::str::FromStr;

/// Declared type of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    ShortText,
    Text,
    LongText,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Bool,
    Time,
}

/// Error for a type name Groonga does not know.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown type: {0}")]
pub struct UnknownTypeError(pub String);

/// Error while casting a generated value into its declared type.
#[derive(Debug, thiserror::Error)]
pub enum CastError {
    /// Text could not be parsed as the declared type
    #[error("invalid {column_type} value: {value:?}")]
    Invalid {
        column_type: ColumnType,
        value: String,
    },

    /// Binary value is not valid UTF-8
    #[error("invalid UTF-8 text: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Local time does not exist (e.g. inside a DST gap)
    #[error("nonexistent local time: {0}")]
    NonexistentTime(String),
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortText => "ShortText",
            Self::Text => "Text",
            Self::LongText => "LongText",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Bool => "Bool",
            Self::Time => "Time",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::ShortText | Self::Text | Self::LongText)
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    fn invalid(self, value: &str) -> CastError {
        CastError::Invalid {
            column_type: self,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ShortText" => Self::ShortText,
            "Text" => Self::Text,
            "LongText" => Self::LongText,
            "Int8" => Self::Int8,
            "Int16" => Self::Int16,
            "Int32" => Self::Int32,
            "Int64" => Self::Int64,
            "UInt8" => Self::UInt8,
            "UInt16" => Self::UInt16,
            "UInt32" => Self::UInt32,
            "UInt64" => Self::UInt64,
            "Float" => Self::Float,
            "Bool" => Self::Bool,
            "Time" => Self::Time,
            other => return Err(UnknownTypeError(other.to_string())),
        })
    }
}

/// Cast substituted template text into the declared type.
///
/// Untyped and text columns keep the string as is. Numeric columns treat an
/// empty string as zero. `Bool` is false only for `""` and `"0"`.
pub fn cast_text(column_type: Option<ColumnType>, value: &str) -> Result<Value, CastError> {
    let Some(column_type) = column_type else {
        return Ok(Value::Text(value.to_string()));
    };
    match column_type {
        t if t.is_signed_integer() => {
            if value.is_empty() {
                return Ok(Value::Int(0));
            }
            value.parse::<i64>().map(Value::Int).map_err(|_| t.invalid(value))
        }
        t if t.is_unsigned_integer() => {
            if value.is_empty() {
                return Ok(Value::UInt(0));
            }
            value.parse::<u64>().map(Value::UInt).map_err(|_| t.invalid(value))
        }
        ColumnType::Float => {
            if value.is_empty() {
                return Ok(Value::Float(0.0));
            }
            value
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ColumnType::Float.invalid(value))
        }
        ColumnType::Bool => Ok(Value::Bool(!(value.is_empty() || value == "0"))),
        ColumnType::Time => parse_time(value),
        _ => Ok(Value::Text(value.to_string())),
    }
}

/// Coerce an already typed value (an expression result) into the declared type.
///
/// Text goes through [`cast_text`]; bytes must be UTF-8 first. Numeric values
/// are widened where that is lossless for Groonga; anything else passes through.
pub fn coerce(column_type: Option<ColumnType>, value: Value) -> Result<Value, CastError> {
    match (column_type, value) {
        (_, Value::Bytes(bytes)) => {
            let text = String::from_utf8(bytes)?;
            match column_type {
                Some(_) => cast_text(column_type, &text),
                None => Ok(Value::Text(text)),
            }
        }
        (Some(t), Value::Text(text)) => cast_text(Some(t), &text),
        (Some(ColumnType::Float), Value::Int(i)) => Ok(Value::Float(i as f64)),
        (Some(ColumnType::Float), Value::UInt(u)) => Ok(Value::Float(u as f64)),
        (Some(ColumnType::Bool), Value::Int(i)) => Ok(Value::Bool(i != 0)),
        (Some(ColumnType::Bool), Value::UInt(u)) => Ok(Value::Bool(u != 0)),
        (Some(t), Value::UInt(u)) if t.is_signed_integer() => i64::try_from(u)
            .map(Value::Int)
            .map_err(|_| t.invalid(&u.to_string())),
        (Some(t), Value::Int(i)) if t.is_unsigned_integer() => u64::try_from(i)
            .map(Value::UInt)
            .map_err(|_| t.invalid(&i.to_string())),
        (Some(t), value) if t.is_text() && !value.is_null() => {
            Ok(Value::Text(value.to_template_string()?))
        }
        (_, value) => Ok(value),
    }
}

/// Parse text for a `Time` column.
///
/// Accepts `YYYY-MM-DD` (local midnight), `YYYY-MM-DD HH:MM:SS +HHMM`,
/// `YYYY-MM-DD HH:MM:SS` (local) and RFC 3339. Anything else is passed
/// through as text for Groonga to interpret.
pub fn parse_time(value: &str) -> Result<Value, CastError> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if value.len() == 10 {
            return local_time(date.and_hms_opt(0, 0, 0).unwrap_or_default(), value);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S %z"] {
        if let Ok(t) = DateTime::parse_from_str(value, format) {
            return Ok(Value::Time(t.with_timezone(&Local)));
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(Value::Time(t.with_timezone(&Local)));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return local_time(naive, value);
        }
    }
    Ok(Value::Text(value.to_string()))
}

fn local_time(naive: NaiveDateTime, original: &str) -> Result<Value, CastError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(Value::Time)
        .ok_or_else(|| CastError::NonexistentTime(original.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_type_names_roundtrip() {
        for name in ["ShortText", "UInt32", "Int64", "Float", "Bool", "Time"] {
            assert_eq!(ColumnType::from_str(name).unwrap().as_str(), name);
        }
        assert_eq!(
            ColumnType::from_str("Geo").unwrap_err(),
            UnknownTypeError("Geo".to_string())
        );
    }

    #[test]
    fn test_cast_untyped_and_text() {
        assert_eq!(cast_text(None, "abc").unwrap(), Value::from("abc"));
        assert_eq!(
            cast_text(Some(ColumnType::LongText), "").unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_cast_numbers() {
        assert_eq!(cast_text(Some(ColumnType::Int32), "").unwrap(), Value::Int(0));
        assert_eq!(cast_text(Some(ColumnType::Int32), "-12").unwrap(), Value::Int(-12));
        assert_eq!(cast_text(Some(ColumnType::UInt8), "7").unwrap(), Value::UInt(7));
        assert_eq!(cast_text(Some(ColumnType::Float), "").unwrap(), Value::Float(0.0));
        assert_eq!(cast_text(Some(ColumnType::Float), "1.5").unwrap(), Value::Float(1.5));
        assert!(cast_text(Some(ColumnType::Int64), "1x").is_err());
    }

    #[test]
    fn test_cast_bool() {
        assert_eq!(cast_text(Some(ColumnType::Bool), "").unwrap(), Value::Bool(false));
        assert_eq!(cast_text(Some(ColumnType::Bool), "0").unwrap(), Value::Bool(false));
        assert_eq!(cast_text(Some(ColumnType::Bool), "1").unwrap(), Value::Bool(true));
        assert_eq!(cast_text(Some(ColumnType::Bool), "no").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_cast_time_with_offset() {
        let value = cast_text(Some(ColumnType::Time), "2022-01-19 00:00:01 +0900").unwrap();
        let Value::Time(t) = value else {
            panic!("expected time, got {value:?}");
        };
        assert_eq!(
            t.with_timezone(&Utc).to_rfc3339(),
            "2022-01-18T15:00:01+00:00"
        );
    }

    #[test]
    fn test_cast_time_bare_date_is_local_midnight() {
        let value = cast_text(Some(ColumnType::Time), "2022-01-19").unwrap();
        let expected = Local.with_ymd_and_hms(2022, 1, 19, 0, 0, 0).unwrap();
        assert_eq!(value, Value::Time(expected));
    }

    #[test]
    fn test_cast_time_unknown_format_passes_through() {
        assert_eq!(
            cast_text(Some(ColumnType::Time), "yesterday").unwrap(),
            Value::from("yesterday")
        );
    }

    #[test]
    fn test_coerce_expression_results() {
        assert_eq!(
            coerce(Some(ColumnType::Float), Value::Int(2)).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            coerce(None, Value::Bytes(b"abc".to_vec())).unwrap(),
            Value::from("abc")
        );
        assert_eq!(
            coerce(Some(ColumnType::ShortText), Value::Int(3)).unwrap(),
            Value::from("3")
        );
        assert!(coerce(Some(ColumnType::UInt32), Value::Int(-1)).is_err());
        assert!(coerce(None, Value::Bytes(vec![0xff])).is_err());
    }
}
