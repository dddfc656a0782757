//! Groonga responses.

use anyhow::{Context, Result};
use serde_json::Value;

/// Return code Groonga uses for invalid arguments.
pub(crate) const INVALID_ARGUMENT: i64 = -22;

/// A parsed Groonga response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub return_code: i64,
    /// Start time in UNIX seconds
    pub start_time: f64,
    /// Elapsed time in seconds
    pub elapsed: f64,
    pub error_message: Option<String>,
    pub body: Value,
}

impl Response {
    pub fn success(body: Value) -> Self {
        Self {
            return_code: 0,
            start_time: 0.0,
            elapsed: 0.0,
            error_message: None,
            body,
        }
    }

    pub fn failure(return_code: i64, message: impl Into<String>) -> Self {
        Self {
            return_code,
            start_time: 0.0,
            elapsed: 0.0,
            error_message: Some(message.into()),
            body: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }

    /// Parse a JSON response body.
    ///
    /// `dump` answers in plain command text, which is taken as the body.
    pub fn parse(text: &str) -> Result<Self> {
        let json: Value = match serde_json::from_str(text) {
            Ok(json) => json,
            Err(_) if !text.trim_start().starts_with(['[', '{']) => {
                return Ok(Self::success(Value::String(text.to_string())));
            }
            Err(e) => return Err(e).context("Invalid Groonga response"),
        };

        match json {
            Value::Array(mut items) if matches!(items.first(), Some(Value::Array(_))) => {
                let body = if items.len() > 1 {
                    items.swap_remove(1)
                } else {
                    Value::Null
                };
                let Value::Array(header) = items.swap_remove(0) else {
                    anyhow::bail!("Invalid Groonga response header: {text}");
                };
                Ok(Self {
                    return_code: header.first().and_then(Value::as_i64).unwrap_or(0),
                    start_time: header.get(1).and_then(Value::as_f64).unwrap_or(0.0),
                    elapsed: header.get(2).and_then(Value::as_f64).unwrap_or(0.0),
                    error_message: header.get(3).and_then(Value::as_str).map(str::to_string),
                    body,
                })
            }
            Value::Object(mut object) if object.contains_key("header") => {
                let header = object.remove("header").unwrap_or(Value::Null);
                let body = object.remove("body").unwrap_or(Value::Null);
                Ok(Self {
                    return_code: header
                        .get("return_code")
                        .and_then(Value::as_i64)
                        .unwrap_or(0),
                    start_time: header
                        .get("start_time")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                    elapsed: header
                        .get("elapsed_time")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                    error_message: header
                        .get("error")
                        .and_then(|error| error.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    body,
                })
            }
            other => anyhow::bail!("Unexpected Groonga response: {other}"),
        }
    }
}
