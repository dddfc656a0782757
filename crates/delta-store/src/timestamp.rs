//! Delta entry timestamps and their file name form.
//!
//! Entry names start with `YYYY-MM-DD-HH-MM-SS-NNNNNNNNN` in UTC. Every field
//! is zero padded, so names sort lexically in chronological order.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use std::fmt;
use std::time::Duration;

/// Length of the timestamp part of an entry name.
pub const TIMESTAMP_NAME_LENGTH: usize = 29;

/// Nanosecond precision point in time identifying a delta entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

/// A parsed entry name: timestamp, optional action and whatever follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName<'a> {
    pub timestamp: Timestamp,
    pub action: Option<&'a str>,
    pub suffix: &'a str,
}

impl Timestamp {
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_unix(seconds: i64, nanoseconds: u32) -> Option<Self> {
        DateTime::from_timestamp(seconds, nanoseconds).map(Self)
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn subsec_nanos(&self) -> u32 {
        self.0.timestamp_subsec_nanos()
    }

    /// Whether this is a full history scan lower bound.
    pub fn is_epoch_or_before(&self) -> bool {
        *self <= Self::epoch()
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// The next representable timestamp.
    pub fn next(&self) -> Self {
        Self(self.0 + chrono::Duration::nanoseconds(1))
    }

    pub fn checked_sub(&self, duration: Duration) -> Option<Self> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        self.0.checked_sub_signed(duration).map(Self)
    }

    /// `YYYY-MM-DD-HH-MM-SS-NNNNNNNNN`
    pub fn to_name(&self) -> String {
        let t = &self.0;
        format!(
            "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}-{:09}",
            t.year(),
            t.month(),
            t.day(),
            t.hour(),
            t.minute(),
            t.second(),
            t.timestamp_subsec_nanos()
        )
    }

    /// `YYYY-MM-DD`, the day bucket directory name.
    pub fn to_day_name(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Parse an entry or bundle name such as
    /// `2022-01-19-00-00-01-000000001-upsert.grn`.
    ///
    /// Returns `None` for names that don't start with a valid timestamp.
    pub fn parse_name(name: &str) -> Option<EntryName<'_>> {
        let head = name.get(..TIMESTAMP_NAME_LENGTH)?;
        let bytes = head.as_bytes();
        let digits = |range: std::ops::Range<usize>| -> Option<u32> {
            let text = head.get(range)?;
            if !text.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            text.parse().ok()
        };
        for separator in [4, 7, 10, 13, 16, 19] {
            if bytes[separator] != b'-' {
                return None;
            }
        }
        let year = digits(0..4)?;
        let month = digits(5..7)?;
        let day = digits(8..10)?;
        let hour = digits(11..13)?;
        let minute = digits(14..16)?;
        let second = digits(17..19)?;
        let nanosecond = digits(20..29)?;

        let datetime = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?
            .and_hms_nano_opt(hour, minute, second, nanosecond)?
            .and_utc();

        let rest = &name[TIMESTAMP_NAME_LENGTH..];
        let (action, suffix) = match rest.strip_prefix('-') {
            Some(after) => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                if end == 0 {
                    (None, rest)
                } else {
                    (Some(&after[..end]), &after[end..])
                }
            }
            None => (None, rest),
        };

        Some(EntryName {
            timestamp: Self(datetime),
            action,
            suffix,
        })
    }

    /// Parse a `YYYY-MM-DD` day bucket name.
    pub fn parse_day_name(name: &str) -> Option<NaiveDate> {
        if name.len() != 10 {
            return None;
        }
        NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_fixed_width() {
        let timestamp = Timestamp::from_unix(1_642_550_401, 7).unwrap();
        assert_eq!(timestamp.to_name(), "2022-01-19-00-00-01-000000007");
        assert_eq!(timestamp.to_day_name(), "2022-01-19");
    }

    #[test]
    fn test_parse_name_with_action_and_suffix() {
        let name = Timestamp::parse_name("2022-01-19-00-00-01-000000007-upsert.parquet").unwrap();
        assert_eq!(name.timestamp, Timestamp::from_unix(1_642_550_401, 7).unwrap());
        assert_eq!(name.action, Some("upsert"));
        assert_eq!(name.suffix, ".parquet");
    }

    #[test]
    fn test_parse_name_schema_and_bundle() {
        let schema = Timestamp::parse_name("2022-01-19-00-00-01-000000007.grn").unwrap();
        assert_eq!(schema.action, None);
        assert_eq!(schema.suffix, ".grn");

        let bundle = Timestamp::parse_name("2022-01-19-00-00-01-000000007").unwrap();
        assert_eq!(bundle.action, None);
        assert_eq!(bundle.suffix, "");
    }

    #[test]
    fn test_parse_name_rejects_garbage() {
        assert!(Timestamp::parse_name(".2022-01-19-00-00-01-000000007.grn").is_none());
        assert!(Timestamp::parse_name("2022-13-19-00-00-01-000000007.grn").is_none());
        assert!(Timestamp::parse_name("2022-01-19").is_none());
        assert!(Timestamp::parse_name("packed").is_none());
    }

    #[test]
    fn test_names_sort_chronologically() {
        let earlier = Timestamp::from_unix(1_642_550_401, 999_999_999).unwrap();
        let later = Timestamp::from_unix(1_642_550_402, 0).unwrap();
        assert!(earlier.to_name() < later.to_name());
        assert!(earlier < later);
        assert_eq!(earlier.next(), later);
    }

    #[test]
    fn test_day_name() {
        assert!(Timestamp::parse_day_name("2022-01-19").is_some());
        assert!(Timestamp::parse_day_name("packed").is_none());
        assert!(Timestamp::parse_day_name("2022-1-19").is_none());
    }
}
