//! Quiet-hours predicates.
//!
//! A sample taken during quiet hours never raises an alert; the detector
//! simply follows the weight. This absorbs restocking, cleaning and
//! unattended periods without a separate timer.

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Decides whether detections are suppressed at a given instant.
pub trait QuietHours {
    fn is_quiet(&self, at: DateTime<Utc>) -> bool;
}

impl<F> QuietHours for F
where
    F: Fn(DateTime<Utc>) -> bool,
{
    fn is_quiet(&self, at: DateTime<Utc>) -> bool {
        self(at)
    }
}

/// Detections are allowed only inside a daily time window on selected days.
///
/// A window whose `end` is earlier than its `start` wraps past midnight; equal
/// bounds cover the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    /// Start of the active window (inclusive), e.g. `"05:00"`.
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    /// End of the active window (exclusive), e.g. `"18:00"`.
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    /// Days on which the window applies. Every other day is quiet.
    pub days: Vec<Weekday>,
    /// Evaluate in this fixed offset instead of the host's local time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            utc_offset_minutes: None,
        }
    }
}

impl ActiveWindow {
    fn wall_clock(&self, at: DateTime<Utc>) -> NaiveDateTime {
        // Out-of-range offsets fall back to local time.
        match self
            .utc_offset_minutes
            .and_then(|minutes| minutes.checked_mul(60))
            .and_then(FixedOffset::east_opt)
        {
            Some(offset) => at.with_timezone(&offset).naive_local(),
            None => at.with_timezone(&Local).naive_local(),
        }
    }

    fn contains_time(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl QuietHours for ActiveWindow {
    fn is_quiet(&self, at: DateTime<Utc>) -> bool {
        let wall = self.wall_clock(at);
        !(self.days.contains(&wall.weekday()) && self.contains_time(wall.time()))
    }
}

/// `HH:MM` (or `HH:MM:SS`) serialization for [`NaiveTime`].
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|err| serde::de::Error::custom(format!("invalid time {raw:?}: {err}")))
    }
}
