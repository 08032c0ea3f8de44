//! Time utilities for plugwatch
//!
//! Provides the wall-clock source used by the reconciler, minute-of-day and
//! day-of-week types for schedule windows, parsing of the 12-hour time strings
//! and frequency strings stored with device schedules, and calendar-month
//! helpers for energy accounting.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `PLUGWATCH_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for exercising schedule windows and month rollover by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! PLUGWATCH_MOCK_TIME="2025-12-31 23:59:30" plugwatchd run
//! ```

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::{PlugwatchError, Result};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "PLUGWATCH_MOCK_TIME";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                if let Ok(naive_dt) =
                    NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
                {
                    if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        "Failed to convert mock time to local timezone"
                    );
                } else {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Wall-clock time of day with minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn of(dt: &DateTime<Local>) -> Self {
        Self {
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
        }
    }

    /// Minutes since midnight
    pub fn minute_of_day(&self) -> u16 {
        (self.hour as u16) * 60 + self.minute as u16
    }

    /// Parse a 12-hour time such as `"1:17 PM"`, `"01:17pm"` or `"12:00 AM"`.
    ///
    /// The AM/PM marker is mandatory; 24-hour strings are rejected.
    pub fn parse_12h(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed.len().saturating_sub(2);
        if trimmed.len() < 2 || !trimmed.is_char_boundary(split) {
            return Err(PlugwatchError::schedule(format!(
                "time '{}' is missing an AM/PM marker",
                s
            )));
        }

        let (clock, marker) = trimmed.split_at(split);
        let pm = match marker.to_ascii_uppercase().as_str() {
            "AM" => false,
            "PM" => true,
            _ => {
                return Err(PlugwatchError::schedule(format!(
                    "time '{}' is missing an AM/PM marker",
                    s
                )));
            }
        };

        let (hour_str, minute_str) = clock
            .trim()
            .split_once(':')
            .ok_or_else(|| PlugwatchError::schedule(format!("time '{}' is not h:mm", s)))?;

        let hour: u8 = hour_str
            .trim()
            .parse()
            .map_err(|_| PlugwatchError::schedule(format!("invalid hour in '{}'", s)))?;
        let minute: u8 = minute_str
            .trim()
            .parse()
            .map_err(|_| PlugwatchError::schedule(format!("invalid minute in '{}'", s)))?;

        if !(1..=12).contains(&hour) {
            return Err(PlugwatchError::schedule(format!("hour must be 1-12 in '{}'", s)));
        }
        if minute >= 60 {
            return Err(PlugwatchError::schedule(format!("minute must be 0-59 in '{}'", s)));
        }

        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };

        Ok(Self { hour, minute })
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minute_of_day().cmp(&other.minute_of_day())
    }
}

/// Days of the week mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DaysOfWeek(u8);

impl DaysOfWeek {
    pub const MONDAY: u8 = 1 << 0;
    pub const TUESDAY: u8 = 1 << 1;
    pub const WEDNESDAY: u8 = 1 << 2;
    pub const THURSDAY: u8 = 1 << 3;
    pub const FRIDAY: u8 = 1 << 4;
    pub const SATURDAY: u8 = 1 << 5;
    pub const SUNDAY: u8 = 1 << 6;

    pub const WEEKDAYS: DaysOfWeek = DaysOfWeek(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const WEEKENDS: DaysOfWeek = DaysOfWeek(Self::SATURDAY | Self::SUNDAY);
    pub const ALL_DAYS: DaysOfWeek = DaysOfWeek(0x7F);
    pub const NONE: DaysOfWeek = DaysOfWeek(0);

    pub fn new(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        (self.0 & Self::bit(weekday)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn bit(weekday: Weekday) -> u8 {
        match weekday {
            Weekday::Mon => Self::MONDAY,
            Weekday::Tue => Self::TUESDAY,
            Weekday::Wed => Self::WEDNESDAY,
            Weekday::Thu => Self::THURSDAY,
            Weekday::Fri => Self::FRIDAY,
            Weekday::Sat => Self::SATURDAY,
            Weekday::Sun => Self::SUNDAY,
        }
    }

    /// Parse a schedule frequency.
    ///
    /// Accepts `daily`, `weekdays`, `weekends`, or a comma-separated day list
    /// using full names, three-letter abbreviations or single-letter codes
    /// (`M`, `T`, `W`, `TH`, `F`, `SAT`, `SUN`), case-insensitively.
    pub fn parse_frequency(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "everyday" | "every day" | "all" => return Ok(Self::ALL_DAYS),
            "weekdays" => return Ok(Self::WEEKDAYS),
            "weekends" => return Ok(Self::WEEKENDS),
            _ => {}
        }

        let mut mask = Self::NONE;
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let day = match token.to_lowercase().as_str() {
                "monday" | "mon" | "m" => Weekday::Mon,
                "tuesday" | "tue" | "tues" | "t" => Weekday::Tue,
                "wednesday" | "wed" | "w" => Weekday::Wed,
                "thursday" | "thu" | "thur" | "thurs" | "th" => Weekday::Thu,
                "friday" | "fri" | "f" => Weekday::Fri,
                "saturday" | "sat" => Weekday::Sat,
                "sunday" | "sun" => Weekday::Sun,
                other => {
                    return Err(PlugwatchError::schedule(format!("unknown day '{}'", other)));
                }
            };
            mask = mask | DaysOfWeek(Self::bit(day));
        }

        if mask.is_empty() {
            return Err(PlugwatchError::schedule(format!("empty frequency '{}'", s)));
        }
        Ok(mask)
    }
}

impl std::ops::BitOr for DaysOfWeek {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A daily window during which a device may be on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: DaysOfWeek,
    pub start: WallClock,
    /// Exclusive: the window closes at this minute
    pub end: WallClock,
}

impl TimeWindow {
    pub fn new(days: DaysOfWeek, start: WallClock, end: WallClock) -> Self {
        Self { days, start, end }
    }

    fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Check if the given local datetime falls within this window
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        if !self.days.contains(dt.weekday()) {
            return false;
        }

        let time = WallClock::of(dt);
        if self.crosses_midnight() {
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }

    /// True once the time of day has reached the window's end and the next
    /// opening has not arrived yet. Ignores the day mask.
    pub fn is_past_end(&self, dt: &DateTime<Local>) -> bool {
        let time = WallClock::of(dt);
        if self.crosses_midnight() {
            time >= self.end && time < self.start
        } else {
            time >= self.end
        }
    }
}

/// Calendar-day key used for daily energy logs (`YYYY-MM-DD`)
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Every calendar day of the month containing `dt`, from the 1st to the last
/// valid day.
pub fn days_of_month(dt: &DateTime<Local>) -> Vec<NaiveDate> {
    let (year, month) = (dt.year(), dt.month());
    (1..=31)
        .map_while(|day| NaiveDate::from_ymd_opt(year, month, day))
        .collect()
}
