//! Shift records: pending (awaiting confirmation) and confirmed.

mod confirmation;
mod finalizer;

pub use confirmation::{ConfirmationWorkflow, ShiftDraft};
pub use finalizer::{FinalizeOutcome, ShiftFinalizer};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Shifts shorter than this are not recorded.
pub const DEFAULT_MIN_SHIFT_MINUTES: i64 = 15;

/// A finalized work interval awaiting explicit user acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingShift {
    pub id: Uuid,
    /// Visit that produced this shift. Used to drop duplicate finalizes.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    /// Calendar day of the rounded start, in the user's offset.
    pub date: NaiveDate,
    pub original_start_time: DateTime<Utc>,
    pub original_end_time: DateTime<Utc>,
    pub was_rounded: bool,
}

impl PendingShift {
    pub fn to_confirmed(&self, user_id: &str) -> ConfirmedShift {
        ConfirmedShift {
            user_id: user_id.to_string(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration_minutes: self.duration_minutes,
            date: self.date,
        }
    }
}

/// The record handed to the shift persistence service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedShift {
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub date: NaiveDate,
}

/// What the persistence service returns after storing a shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredShift {
    pub id: String,
    #[serde(flatten)]
    pub shift: ConfirmedShift,
}

/// Whole minutes between two instants, floored.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().div_euclid(60)
}

/// Calendar day of `t` as seen in `offset`.
pub fn local_date(t: DateTime<Utc>, offset: &FixedOffset) -> NaiveDate {
    t.with_timezone(offset).date_naive()
}

/// Check an explicit start/end pair and return its duration in minutes.
pub fn validate_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_minutes: i64,
) -> Result<i64, ValidationError> {
    if end <= start {
        return Err(ValidationError::InvalidTimeRange { start, end });
    }
    let minutes = duration_minutes(start, end);
    if minutes < min_minutes {
        return Err(ValidationError::TooShort {
            minutes,
            min_minutes,
        });
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn duration_floors_partial_minutes() {
        let start = Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap();
        let end = start + chrono::Duration::seconds(15 * 60 + 59);
        assert_eq!(duration_minutes(start, end), 15);
        assert_eq!(duration_minutes(end, start), -16);
    }

    #[test]
    fn validate_range_rejects_inverted_and_short() {
        let start = Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap();
        assert!(matches!(
            validate_range(start, start, 15),
            Err(ValidationError::InvalidTimeRange { .. })
        ));
        assert_eq!(
            validate_range(start, start + chrono::Duration::minutes(14), 15),
            Err(ValidationError::TooShort {
                minutes: 14,
                min_minutes: 15
            })
        );
        assert_eq!(
            validate_range(start, start + chrono::Duration::minutes(15), 15),
            Ok(15)
        );
    }

    #[test]
    fn local_date_follows_offset() {
        let t = Utc.with_ymd_and_hms(2024, 3, 11, 23, 30, 0).unwrap();
        let cet = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(local_date(t, &cet), NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
    }
}
