//! Turns a completed visit into a pending shift.
//!
//! Both boundaries are rounded in the user's offset, the duration is taken
//! from the rounded values, and visits below the minimum are discarded.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{duration_minutes, local_date, PendingShift, DEFAULT_MIN_SHIFT_MINUTES};
use crate::rounding::RoundingPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    Pending(PendingShift),
    Discarded {
        duration_minutes: i64,
        rounded_start: DateTime<Utc>,
        rounded_end: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct ShiftFinalizer {
    pub policy: RoundingPolicy,
    pub min_shift_minutes: i64,
    pub offset: FixedOffset,
}

impl Default for ShiftFinalizer {
    fn default() -> Self {
        Self {
            policy: RoundingPolicy::default(),
            min_shift_minutes: DEFAULT_MIN_SHIFT_MINUTES,
            offset: utc(),
        }
    }
}

impl ShiftFinalizer {
    pub fn new(policy: RoundingPolicy, min_shift_minutes: i64, offset: FixedOffset) -> Self {
        Self {
            policy,
            min_shift_minutes,
            offset,
        }
    }

    pub fn finalize(&self, entered_at: DateTime<Utc>, exit_at: DateTime<Utc>) -> FinalizeOutcome {
        let start = self
            .policy
            .round_entry(&entered_at.with_timezone(&self.offset))
            .with_timezone(&Utc);
        let end = self
            .policy
            .round_exit(&exit_at.with_timezone(&self.offset))
            .with_timezone(&Utc);
        let minutes = duration_minutes(start, end);

        if minutes < self.min_shift_minutes {
            return FinalizeOutcome::Discarded {
                duration_minutes: minutes,
                rounded_start: start,
                rounded_end: end,
            };
        }

        FinalizeOutcome::Pending(PendingShift {
            id: Uuid::new_v4(),
            session_id: None,
            start_time: start,
            end_time: end,
            duration_minutes: minutes,
            date: local_date(start, &self.offset),
            original_start_time: entered_at,
            original_end_time: exit_at,
            was_rounded: true,
        })
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, h, m, 0).unwrap()
    }

    #[test]
    fn full_day_rounds_to_half_hours() {
        let outcome = ShiftFinalizer::default().finalize(at(9, 7), at(17, 52));
        let FinalizeOutcome::Pending(shift) = outcome else {
            panic!("expected a pending shift");
        };
        assert_eq!(shift.start_time, at(9, 0));
        assert_eq!(shift.end_time, at(18, 0));
        assert_eq!(shift.duration_minutes, 540);
        assert_eq!(shift.date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(shift.original_start_time, at(9, 7));
        assert_eq!(shift.original_end_time, at(17, 52));
        assert!(shift.was_rounded);
    }

    #[test]
    fn short_visit_collapsing_to_same_boundary_is_discarded() {
        let outcome = ShiftFinalizer::default().finalize(at(9, 50), at(9, 58));
        assert_eq!(
            outcome,
            FinalizeOutcome::Discarded {
                duration_minutes: 0,
                rounded_start: at(10, 0),
                rounded_end: at(10, 0),
            }
        );
    }

    #[test]
    fn exactly_minimum_after_rounding_is_kept() {
        // 09:20 -> 09:30, 09:50 -> 10:00: 30 minutes.
        let finalizer = ShiftFinalizer {
            min_shift_minutes: 30,
            ..ShiftFinalizer::default()
        };
        assert!(matches!(
            finalizer.finalize(at(9, 20), at(9, 50)),
            FinalizeOutcome::Pending(_)
        ));
    }

    #[test]
    fn exit_before_entry_is_discarded() {
        let outcome = ShiftFinalizer::default().finalize(at(12, 0), at(9, 0));
        assert!(matches!(
            outcome,
            FinalizeOutcome::Discarded { duration_minutes: -180, .. }
        ));
    }

    #[test]
    fn date_uses_local_offset() {
        // 23:40 UTC on the 10th is 00:40 on the 11th in +01:00.
        let cet = FixedOffset::east_opt(3600).unwrap();
        let finalizer = ShiftFinalizer::new(RoundingPolicy::Nearest, 15, cet);
        let start = Utc.with_ymd_and_hms(2024, 3, 10, 23, 40, 0).unwrap();
        let end = start + chrono::Duration::hours(4);
        let FinalizeOutcome::Pending(shift) = finalizer.finalize(start, end) else {
            panic!("expected a pending shift");
        };
        assert_eq!(shift.date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(shift.start_time, Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap());
    }

    #[test]
    fn favorable_policy_widens_the_shift() {
        let finalizer = ShiftFinalizer::new(RoundingPolicy::EmployeeFavorable, 15, utc());
        let FinalizeOutcome::Pending(shift) = finalizer.finalize(at(9, 7), at(17, 10)) else {
            panic!("expected a pending shift");
        };
        assert_eq!(shift.start_time, at(9, 0));
        assert_eq!(shift.end_time, at(17, 30));
        assert_eq!(shift.duration_minutes, 510);
    }
}
