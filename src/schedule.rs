//! Timetable departure times.
//!
//! Timetables write departures as `HH:MM:SS` relative to the trip's service
//! day, with hours of 24 and above meaning the early hours of the next
//! calendar day (`25:10:00` is 01:10 the day after).

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleTimeError {
    #[error("expected HH:MM:SS, got {0:?}")]
    Malformed(String),
    #[error("time field out of range in {0:?}")]
    OutOfRange(String),
}

/// Departures more than a week past the service date are not plausible.
pub const MAX_OVERFLOW_DAYS: u32 = 7;

/// A departure time split into whole days past the service date and a
/// wall-clock time within that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScheduleTime {
    overflow_days: u32,
    time: NaiveTime,
}

impl ScheduleTime {
    pub fn overflow_days(&self) -> u32 {
        self.overflow_days
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// The instant this departure happens for a trip running on `service_date`,
    /// or `None` past the end of the representable calendar.
    pub fn on(&self, service_date: NaiveDate) -> Option<NaiveDateTime> {
        service_date
            .and_time(self.time)
            .checked_add_signed(TimeDelta::days(i64::from(self.overflow_days)))
    }
}

impl FromStr for ScheduleTime {
    type Err = ScheduleTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ScheduleTimeError::Malformed(s.to_string());

        let mut parts = s.trim().split(':');
        let mut field = || -> Result<u32, ScheduleTimeError> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(malformed)
        };
        let (hours, minutes, seconds) = (field()?, field()?, field()?);
        if parts.next().is_some() {
            return Err(malformed());
        }

        let out_of_range = || ScheduleTimeError::OutOfRange(s.to_string());
        if hours / 24 > MAX_OVERFLOW_DAYS {
            return Err(out_of_range());
        }
        let time = NaiveTime::from_hms_opt(hours % 24, minutes, seconds).ok_or_else(out_of_range)?;

        Ok(Self {
            overflow_days: hours / 24,
            time,
        })
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.overflow_days * 24 + chrono::Timelike::hour(&self.time);
        write!(f, "{:02}:{}", hours, self.time.format("%M:%S"))
    }
}

/// Parses `raw` and places it on `service_date`.
pub fn normalize(raw: &str, service_date: NaiveDate) -> Result<NaiveDateTime, ScheduleTimeError> {
    raw.parse::<ScheduleTime>()?
        .on(service_date)
        .ok_or_else(|| ScheduleTimeError::OutOfRange(raw.to_string()))
}
