//! Persisted tracking state and the detector phase derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::WorkSite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Outside,
    EnteredUnconfirmed,
    AtWork,
}

/// Start of a shift whose arrival survived the dwell window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedStart {
    pub start_time: DateTime<Utc>,
    pub confirmed: bool,
}

/// Singleton state of the current visit.
///
/// `entered_at` is set exactly when a visit is open. `revision` grows with
/// every committed write and backs the store's compare-and-swap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingState {
    pub is_at_work: bool,
    pub entered_at: Option<DateTime<Utc>>,
    pub confirmed_shift: Option<ConfirmedStart>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub revision: u64,
    /// Timestamp of the newest signal applied; older ones are stale.
    #[serde(default)]
    pub last_signal_at: Option<DateTime<Utc>>,
}

impl TrackingState {
    pub fn phase(&self) -> Phase {
        match (self.is_at_work, self.entered_at, self.confirmed_shift) {
            (true, Some(_), Some(c)) if c.confirmed => Phase::AtWork,
            (true, Some(_), _) => Phase::EnteredUnconfirmed,
            _ => Phase::Outside,
        }
    }

    /// True when the flags contradict each other (e.g. at work without an
    /// entry time). Such state is treated as no active session.
    pub fn is_inconsistent(&self) -> bool {
        self.is_at_work != self.entered_at.is_some()
    }

    pub fn entered(&self, at: DateTime<Utc>, session_id: Uuid) -> Self {
        Self {
            is_at_work: true,
            entered_at: Some(at),
            confirmed_shift: None,
            session_id: Some(session_id),
            revision: self.revision,
            last_signal_at: Some(self.watermark(at)),
        }
    }

    pub fn confirmed(&self) -> Self {
        Self {
            confirmed_shift: self.entered_at.map(|start_time| ConfirmedStart {
                start_time,
                confirmed: true,
            }),
            ..self.clone()
        }
    }

    /// Outside again. Keeps the revision and signal watermark so late
    /// signals from the finished visit stay stale.
    pub fn cleared(&self) -> Self {
        Self {
            revision: self.revision,
            last_signal_at: self.last_signal_at,
            ..Self::default()
        }
    }

    /// Advance the watermark to the time of the signal being applied.
    /// Timer-driven transitions pass `None` and leave it alone.
    pub fn observed(self, signal_at: Option<DateTime<Utc>>) -> Self {
        match signal_at {
            Some(at) => Self {
                last_signal_at: Some(self.watermark(at)),
                ..self
            },
            None => self,
        }
    }

    /// True when a signal stamped `at` predates the newest applied signal.
    pub fn is_stale(&self, at: DateTime<Utc>) -> bool {
        self.last_signal_at.is_some_and(|last| at < last)
    }

    fn watermark(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.last_signal_at.map_or(at, |last| last.max(at))
    }
}

/// Snapshot exposed to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub is_tracking: bool,
    pub phase: Phase,
    pub is_at_work: bool,
    pub entered_at: Option<DateTime<Utc>>,
    pub confirmed_shift: Option<ConfirmedStart>,
    pub site: Option<WorkSite>,
}

impl TrackingStatus {
    pub fn new(state: &TrackingState, site: Option<WorkSite>) -> Self {
        Self {
            is_tracking: site.is_some(),
            phase: state.phase(),
            is_at_work: state.is_at_work,
            entered_at: state.entered_at,
            confirmed_shift: state.confirmed_shift,
            site,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, h, m, 0).unwrap()
    }

    #[test]
    fn lifecycle_phases() {
        let state = TrackingState::default();
        assert_eq!(state.phase(), Phase::Outside);

        let entered = state.entered(at(9, 0), Uuid::new_v4());
        assert_eq!(entered.phase(), Phase::EnteredUnconfirmed);
        assert!(!entered.is_inconsistent());

        let confirmed = entered.confirmed().observed(Some(at(9, 15)));
        assert_eq!(confirmed.phase(), Phase::AtWork);
        assert_eq!(confirmed.confirmed_shift.unwrap().start_time, at(9, 0));

        let cleared = confirmed.cleared().observed(Some(at(17, 0)));
        assert_eq!(cleared.phase(), Phase::Outside);
        assert!(cleared.entered_at.is_none());
        assert_eq!(cleared.last_signal_at, Some(at(17, 0)));
    }

    #[test]
    fn at_work_without_entry_time_is_outside() {
        let state = TrackingState {
            is_at_work: true,
            ..TrackingState::default()
        };
        assert!(state.is_inconsistent());
        assert_eq!(state.phase(), Phase::Outside);
    }

    #[test]
    fn watermark_only_moves_forward() {
        let state = TrackingState::default().entered(at(9, 0), Uuid::new_v4());
        assert!(state.is_stale(at(8, 59)));
        assert!(!state.is_stale(at(9, 0)));
        let cleared = state.cleared().observed(Some(at(8, 0)));
        assert_eq!(cleared.last_signal_at, Some(at(9, 0)));
        assert_eq!(cleared.clone().observed(None), cleared);
    }

    #[test]
    fn legacy_json_without_new_fields_parses() {
        let state: TrackingState =
            serde_json::from_str(r#"{"is_at_work":false,"entered_at":null,"confirmed_shift":null}"#)
                .unwrap();
        assert_eq!(state, TrackingState::default());
    }
}
