//! Job trigger semantics
//!
//! A trigger determines a job's first and subsequent fire times. Two
//! families exist:
//!
//! - [`Trigger::Interval`]: the first fire is the moment of registration;
//!   each next fire is the wall-clock time at the moment the previous run
//!   *finished*, plus the interval. This is not a fixed-rate clock — drift
//!   accumulates with run duration so that runs can never overlap.
//! - [`Trigger::Daily`]: fires at a fixed UTC time-of-day. The next fire is
//!   recomputed as "next occurrence of that time" relative to the current
//!   clock after every completion, which tolerates clock adjustments
//!   instead of blindly accumulating 24h offsets. The
//!   [`Trigger::DailyFirstRun`] sentinel fires immediately and captures the
//!   time of its first run as the daily time for all future occurrences.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};

use crate::error::{Error, Result};

/// Rule determining a job's first and subsequent fire times
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed pause between the end of one run and the start of the next
    Interval(Duration),

    /// Fixed UTC time-of-day
    Daily(NaiveTime),

    /// Fires immediately; the first run's UTC time-of-day becomes the
    /// daily time from then on
    DailyFirstRun,
}

impl Trigger {
    /// Parse a daily trigger spec: `"HH:MM"` or the `"now"` sentinel
    pub fn daily(spec: &str) -> Result<Self> {
        if spec == "now" {
            return Ok(Self::DailyFirstRun);
        }
        NaiveTime::parse_from_str(spec, "%H:%M")
            .map(Self::Daily)
            .map_err(|_| {
                Error::config(format!(
                    "invalid daily time '{spec}': expected HH:MM or \"now\""
                ))
            })
    }

    /// Fire time for the first run, given the registration time
    ///
    /// `DailyFirstRun` degrades to `Daily` here: the registration time is
    /// the first run time, and its time-of-day is captured.
    pub fn first_fire(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Interval(_) => now,
            Self::Daily(time) => next_occurrence(now, *time),
            Self::DailyFirstRun => {
                *self = Self::Daily(now.time());
                now
            }
        }
    }

    /// Fire time for the next run, given the completion time of the
    /// previous one
    pub fn next_fire(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Interval(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                // absurdly large intervals clamp to the far future
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Self::Daily(time) => next_occurrence(now, *time),
            // Unreached once first_fire has run; capture here as well so
            // the trigger is well-defined in isolation.
            Self::DailyFirstRun => {
                *self = Self::Daily(now.time());
                now
            }
        }
    }
}

/// Next occurrence of a UTC time-of-day: today if the time has not strictly
/// passed, else tomorrow
fn next_occurrence(now: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let candidate = now.date_naive().and_time(time).and_utc();
    if candidate < now {
        candidate + chrono::Duration::days(1)
    } else {
        candidate
    }
}
