//! Wall-clock bookkeeping for watering decisions.
//!
//! All scheduling works at minute granularity on "HH:MM" wall-clock values:
//! a `WallTime` never carries seconds, and comparisons between two
//! `WallTime`s order the same way their zero-padded strings would.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const MINUTES_PER_DAY: i64 = 24 * 60;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid time format: {0:?} (expected HH:MM)")]
    InvalidFormat(String),
    #[error("invalid date: {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

// ---------------------------------------------------------------------------
// WallTime
// ---------------------------------------------------------------------------

/// A time of day with minute precision, rendered as "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime {
    hour: u8,
    minute: u8,
}

impl WallTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, TimeError> {
        if hour > 23 || minute > 59 {
            return Err(TimeError::InvalidFormat(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    fn minutes_of_day(self) -> i64 {
        self.hour as i64 * 60 + self.minute as i64
    }

    /// Wraps around midnight in both directions.
    fn from_minutes_of_day(minutes: i64) -> Self {
        let m = minutes.rem_euclid(MINUTES_PER_DAY);
        Self {
            hour: (m / 60) as u8,
            minute: (m % 60) as u8,
        }
    }

    pub fn minus_minutes(self, minutes: i64) -> Self {
        Self::from_minutes_of_day(self.minutes_of_day() - minutes)
    }

    /// Minutes from `self` forward to `later`, rolling over midnight once.
    pub fn minutes_until(self, later: WallTime) -> i64 {
        let mut end = later.minutes_of_day();
        if later < self {
            end += MINUTES_PER_DAY;
        }
        end - self.minutes_of_day()
    }

    /// Inclusive containment; `start > end` is an overnight interval.
    pub fn is_within(self, start: WallTime, end: WallTime) -> bool {
        let start_m = start.minutes_of_day();
        let mut end_m = end.minutes_of_day();
        let mut check_m = self.minutes_of_day();

        if end < start {
            end_m += MINUTES_PER_DAY;
            if self < start {
                check_m += MINUTES_PER_DAY;
            }
        }

        start_m <= check_m && check_m <= end_m
    }
}

impl From<time::Time> for WallTime {
    fn from(t: time::Time) -> Self {
        Self {
            hour: t.hour(),
            minute: t.minute(),
        }
    }
}

impl FromStr for WallTime {
    type Err = TimeError;

    /// Accepts one- or two-digit fields ("9:05" normalises to "09:05").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeError::InvalidFormat(s.to_string());

        let field = |part: &str, max: u8| -> Option<u8> {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            part.parse::<u8>().ok().filter(|v| *v <= max)
        };

        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        let hour = field(h, 23).ok_or_else(invalid)?;
        let minute = field(m, 59).ok_or_else(invalid)?;
        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for WallTime {
    type Error = TimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WallTime> for String {
    fn from(t: WallTime) -> Self {
        t.to_string()
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ---------------------------------------------------------------------------
// Weekday
// ---------------------------------------------------------------------------

/// Day of week as it appears in schedules ("Monday" .. "Sunday").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    #[serde(alias = "Mon", alias = "monday")]
    Monday,
    #[serde(alias = "Tue", alias = "tuesday")]
    Tuesday,
    #[serde(alias = "Wed", alias = "wednesday")]
    Wednesday,
    #[serde(alias = "Thu", alias = "thursday")]
    Thursday,
    #[serde(alias = "Fri", alias = "friday")]
    Friday,
    #[serde(alias = "Sat", alias = "saturday")]
    Saturday,
    #[serde(alias = "Sun", alias = "sunday")]
    Sunday,
}

impl From<time::Weekday> for Weekday {
    fn from(w: time::Weekday) -> Self {
        match w {
            time::Weekday::Monday => Self::Monday,
            time::Weekday::Tuesday => Self::Tuesday,
            time::Weekday::Wednesday => Self::Wednesday,
            time::Weekday::Thursday => Self::Thursday,
            time::Weekday::Friday => Self::Friday,
            time::Weekday::Saturday => Self::Saturday,
            time::Weekday::Sunday => Self::Sunday,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;
}

/// System time shifted to a fixed local UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    /// Must be called while the process is still single-threaded: `time`
    /// refuses to read the local offset once other threads exist.
    pub fn detect() -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or_else(|e| {
            tracing::warn!("could not determine local utc offset ({e}), using UTC");
            UtcOffset::UTC
        });
        Self { offset }
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

// ---------------------------------------------------------------------------
// TimeKeeper
// ---------------------------------------------------------------------------

/// Tracks the current time plus when the plant was last watered.
pub struct TimeKeeper {
    clock: Arc<dyn Clock>,
    pub(crate) current_time: WallTime,
    pub(crate) time_last_watered: Option<WallTime>,
    pub(crate) date_last_watered: Option<Date>,
}

impl TimeKeeper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let current_time = WallTime::from(clock.now().time());
        Self {
            clock,
            current_time,
            time_last_watered: None,
            date_last_watered: None,
        }
    }

    pub fn get_current_time(&self) -> WallTime {
        WallTime::from(self.clock.now().time())
    }

    pub fn get_current_date(&self) -> Date {
        self.clock.now().date()
    }

    pub fn get_current_weekday(&self) -> Weekday {
        self.clock.now().weekday().into()
    }

    /// Current time shifted back by `minutes`, wrapping at midnight. Any
    /// delta is accepted; whole days fall away.
    pub fn get_current_time_minus_delta(&self, minutes: i64) -> WallTime {
        self.get_current_time().minus_minutes(minutes)
    }

    /// Validates and normalises an "HH:MM" string.
    pub fn get_time_from_time_string(s: &str) -> Result<WallTime, TimeError> {
        s.parse()
    }

    pub fn get_time_difference_minutes(t1: &str, t2: &str) -> Result<i64, TimeError> {
        let t1: WallTime = t1.parse()?;
        let t2: WallTime = t2.parse()?;
        Ok(t1.minutes_until(t2))
    }

    pub fn is_time_within_interval(check: &str, start: &str, end: &str) -> Result<bool, TimeError> {
        let check: WallTime = check.parse()?;
        Ok(check.is_within(start.parse()?, end.parse()?))
    }

    pub fn current_time(&self) -> WallTime {
        self.current_time
    }

    pub fn time_last_watered(&self) -> Option<WallTime> {
        self.time_last_watered
    }

    pub fn date_last_watered(&self) -> Option<Date> {
        self.date_last_watered
    }

    pub fn set_current_time(&mut self, value: &str) -> Result<(), TimeError> {
        self.current_time = value.parse()?;
        Ok(())
    }

    pub fn set_time_last_watered(&mut self, value: &str) -> Result<(), TimeError> {
        self.time_last_watered = Some(value.parse()?);
        Ok(())
    }

    pub fn set_date_last_watered(&mut self, value: &str) -> Result<(), TimeError> {
        let date = Date::parse(value, format_description!("[year]-[month]-[day]"))
            .map_err(|_| TimeError::InvalidDate(value.to_string()))?;
        self.date_last_watered = Some(date);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test clock
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) struct ManualClock {
    now: std::sync::Mutex<PrimitiveDateTime>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(at: PrimitiveDateTime) -> Arc<Self> {
        Arc::new(Self {
            now: std::sync::Mutex::new(at),
        })
    }

    pub(crate) fn set(&self, at: PrimitiveDateTime) {
        *self.now.lock().unwrap() = at;
    }

    pub(crate) fn advance_minutes(&self, minutes: i64) {
        *self.now.lock().unwrap() += time::Duration::minutes(minutes);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> PrimitiveDateTime {
        *self.now.lock().unwrap()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
