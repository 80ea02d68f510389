//! Half-hour rounding of shift boundaries.
//!
//! The default rule looks only at the minute of the hour:
//!
//! ```text
//!  0..=15  -> hh:00
//! 16..=45  -> hh:30
//! 46..=59  -> (hh+1):00
//! ```
//!
//! Rounding happens in the offset of the timestamp passed in, so callers
//! convert to the user's local offset first.

use chrono::{DateTime, Duration, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Which rule applies to shift start and end times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Start and end both snap to the nearest boundary using [`round`].
    #[default]
    Nearest,
    /// Start floors and end ceils to a half-hour boundary.
    EmployeeFavorable,
}

impl RoundingPolicy {
    pub fn round_entry<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            RoundingPolicy::Nearest => round(t),
            RoundingPolicy::EmployeeFavorable => floor_half_hour(t),
        }
    }

    pub fn round_exit<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            RoundingPolicy::Nearest => round(t),
            RoundingPolicy::EmployeeFavorable => ceil_half_hour(t),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundingPolicy::Nearest => "nearest",
            RoundingPolicy::EmployeeFavorable => "employee_favorable",
        }
    }
}

/// Round `t` to `:00` or `:30` based on its minute of the hour.
pub fn round<Tz: TimeZone>(t: &DateTime<Tz>) -> DateTime<Tz> {
    let hour = truncate_to_hour(t);
    match t.minute() {
        0..=15 => hour,
        16..=45 => hour + Duration::minutes(30),
        _ => hour + Duration::hours(1),
    }
}

/// Largest half-hour boundary `<= t`.
pub fn floor_half_hour<Tz: TimeZone>(t: &DateTime<Tz>) -> DateTime<Tz> {
    let hour = truncate_to_hour(t);
    if t.minute() >= 30 {
        hour + Duration::minutes(30)
    } else {
        hour
    }
}

/// Smallest half-hour boundary `>= t`.
pub fn ceil_half_hour<Tz: TimeZone>(t: &DateTime<Tz>) -> DateTime<Tz> {
    let floor = floor_half_hour(t);
    if floor == *t {
        floor
    } else {
        floor + Duration::minutes(30)
    }
}

fn truncate_to_hour<Tz: TimeZone>(t: &DateTime<Tz>) -> DateTime<Tz> {
    t.clone()
        - Duration::minutes(i64::from(t.minute()))
        - Duration::seconds(i64::from(t.second()))
        - Duration::nanoseconds(i64::from(t.nanosecond()))
}
