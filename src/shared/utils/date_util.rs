use jiff::{SignedDuration, Timestamp};
use std::str::FromStr;

pub type DateTime = Timestamp;
pub type Duration = SignedDuration;

/// Thin wrapper around `jiff` so the rest of the crate never touches the
/// time library directly.
pub struct DateUtil;

impl DateUtil {
    /// Current UTC instant
    pub fn now() -> DateTime {
        Timestamp::now()
    }

    pub fn from_rfc3339(s: &str) -> Result<DateTime, jiff::Error> {
        Timestamp::from_str(s)
    }

    pub fn to_rfc3339(dt: &DateTime) -> String {
        dt.to_string()
    }

    pub fn to_timestamp_millis(dt: &DateTime) -> i64 {
        dt.as_millisecond()
    }
}

// Duration helpers
impl DateUtil {
    pub fn seconds(seconds: i64) -> Duration {
        SignedDuration::new(seconds, 0)
    }

    pub fn milliseconds(milliseconds: i64) -> Duration {
        SignedDuration::from_millis(milliseconds)
    }

    /// Converts a std duration coming from configuration, saturating on overflow.
    pub fn from_std(duration: std::time::Duration) -> Duration {
        SignedDuration::try_from(duration).unwrap_or(SignedDuration::MAX)
    }
}

// DateTime operations
impl DateUtil {
    /// Adds a duration, saturating at the far end of the representable range.
    pub fn add_duration(dt: &DateTime, duration: Duration) -> DateTime {
        dt.checked_add(duration).unwrap_or(Timestamp::MAX)
    }

    pub fn sub_duration(dt: &DateTime, duration: Duration) -> DateTime {
        dt.checked_sub(duration).unwrap_or(Timestamp::MIN)
    }

    /// `true` once `dt` is at or before the current instant.
    pub fn is_elapsed(dt: &DateTime) -> bool {
        dt <= &Self::now()
    }

    pub fn is_future(dt: &DateTime) -> bool {
        dt > &Self::now()
    }

    pub fn duration_between(dt1: &DateTime, dt2: &DateTime) -> Duration {
        dt2.duration_since(*dt1)
    }
}
