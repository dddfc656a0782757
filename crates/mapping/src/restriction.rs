use chrono::{DateTime, Local};
use delta_core::types::parse_time;
use delta_core::Value;

use crate::error::ConfigError;

/// Value limits applied to generated records of one destination table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restriction {
    pub time: TimeRestriction,
}

/// Range `Time` columns are clamped into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRestriction {
    pub min: Option<DateTime<Local>>,
    pub max: Option<DateTime<Local>>,
}

impl Restriction {
    pub(crate) fn parse(value: Option<&serde_yaml::Value>) -> Result<Self, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        let time = match value.get("time") {
            Some(time) => TimeRestriction {
                min: parse_limit(time.get("min"))?,
                max: parse_limit(time.get("max"))?,
            },
            None => TimeRestriction::default(),
        };
        Ok(Self { time })
    }
}

impl TimeRestriction {
    pub fn clamp(&self, value: Value) -> Value {
        let Value::Time(time) = value else {
            return value;
        };
        if let Some(max) = self.max {
            if time > max {
                return Value::Time(max);
            }
        }
        if let Some(min) = self.min {
            if time < min {
                return Value::Time(min);
            }
        }
        Value::Time(time)
    }
}

fn parse_limit(value: Option<&serde_yaml::Value>) -> Result<Option<DateTime<Local>>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let text = value
        .as_str()
        .ok_or_else(|| ConfigError::new(format!("time restriction must be a string: {value:?}")))?;
    match parse_time(text) {
        Ok(Value::Time(time)) => Ok(Some(time)),
        _ => Err(ConfigError::new(format!(
            "invalid time restriction value: {text}"
        ))),
    }
}
