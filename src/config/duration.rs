//! Span and size parsing utilities.

use super::ConfigError;

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;
const MONTH: f64 = 30.44 * DAY;
const YEAR: f64 = 365.25 * DAY;

/// Parse a span string like "30", "1.5h", "2days" into seconds.
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Seconds: "300s", "300sec", "300second", "300seconds"
/// - Minutes: "30m", "30min", "30minute", "30minutes"
/// - Hours: "1h", "1hr", "1hour", "1hours"
/// - Days: "1d", "1day", "1days"
/// - Weeks: "1w", "1week", "1weeks"
/// - Months of 30.44 days: "1month", "1months"
/// - Years of 365.25 days: "1y", "1year", "1years"
pub fn parse_span(s: &str) -> Result<f64, ConfigError> {
    let invalid = || ConfigError::new(format!("invalid span value: {s:?}"));

    let trimmed = s.trim();
    let unit_start = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(unit_start);
    if number.is_empty() {
        return Err(invalid());
    }
    let number: f64 = number.parse().map_err(|_| invalid())?;

    let scale = match unit {
        "" | "s" | "sec" | "second" | "seconds" => 1.0,
        "m" | "min" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "month" | "months" => MONTH,
        "y" | "year" | "years" => YEAR,
        _ => return Err(invalid()),
    };
    Ok(number * scale)
}

/// Parse a size string like "512k", "16M" or "1G" into bytes.
pub fn parse_size(s: &str) -> Result<usize, ConfigError> {
    let invalid = || ConfigError::new(format!("invalid size value: {s:?}"));

    let mut chars = s.chars();
    let scale: usize = match chars.next_back() {
        Some('k' | 'K') => 1024,
        Some('m' | 'M') => 1024 * 1024,
        Some('g' | 'G') => 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };
    let number = chars.as_str();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    number
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(invalid)
}
