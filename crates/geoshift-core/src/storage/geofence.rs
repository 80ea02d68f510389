//! Typed access to the geofence keys with a single-writer gate.
//!
//! Every read-modify-write of tracking state, the work site or the pending
//! queue goes through a [`StoreGuard`], which holds the gate for its whole
//! lifetime. Commits are additionally guarded by the raw value that was read,
//! so a second process writing the same store cannot be overwritten blindly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::kv::{Batch, KeyValueStore};
use crate::error::StoreError;
use crate::geo::WorkSite;
use crate::shift::PendingShift;
use crate::tracking::TrackingState;

pub const STATE_KEY: &str = "geofence.tracking_state";
pub const SITE_KEY: &str = "geofence.work_site";
pub const PENDING_KEY: &str = "geofence.pending_shifts";

/// Tracking state as read, plus the raw value used to guard the next write.
#[derive(Debug, Clone)]
pub struct StateRecord {
    pub state: TrackingState,
    raw: Option<String>,
}

/// Pending queue as read, plus the raw value used to guard the next write.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub shifts: Vec<PendingShift>,
    raw: Option<String>,
}

#[derive(Clone)]
pub struct GeofenceStore {
    kv: Arc<dyn KeyValueStore>,
    gate: Arc<Mutex<()>>,
}

impl GeofenceStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Wait for exclusive access.
    pub async fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            kv: self.kv.as_ref(),
            _gate: self.gate.lock().await,
        }
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }
}

pub struct StoreGuard<'a> {
    kv: &'a dyn KeyValueStore,
    _gate: MutexGuard<'a, ()>,
}

impl StoreGuard<'_> {
    /// Missing or unparseable state reads as "no active session".
    pub async fn load_state(&self) -> Result<StateRecord, StoreError> {
        let raw = self.kv.get(STATE_KEY).await?;
        let state = match raw.as_deref() {
            None => TrackingState::default(),
            Some(json) => match serde_json::from_str::<TrackingState>(json) {
                Ok(state) if state.is_inconsistent() => {
                    warn!(?state, "inconsistent tracking state, resetting to outside");
                    TrackingState {
                        revision: state.revision,
                        last_signal_at: state.last_signal_at,
                        ..TrackingState::default()
                    }
                }
                Ok(state) => state,
                Err(e) => {
                    warn!(error = %e, "unparseable tracking state, resetting to outside");
                    TrackingState::default()
                }
            },
        };
        Ok(StateRecord { state, raw })
    }

    /// Missing or unparseable site reads as "not tracking".
    pub async fn load_site(&self) -> Result<Option<WorkSite>, StoreError> {
        let Some(json) = self.kv.get(SITE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<WorkSite>(&json) {
            Ok(site) => Ok(Some(site)),
            Err(e) => {
                warn!(error = %e, "unparseable work site, treating tracking as stopped");
                Ok(None)
            }
        }
    }

    /// Unparseable queue contents read as empty and are logged; the raw value
    /// still guards the next write.
    pub async fn load_pending(&self) -> Result<PendingRecord, StoreError> {
        let raw = self.kv.get(PENDING_KEY).await?;
        let shifts = match raw.as_deref() {
            None => Vec::new(),
            Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
                warn!(error = %e, "unparseable pending shift queue");
                Vec::new()
            }),
        };
        Ok(PendingRecord { shifts, raw })
    }

    /// Write `next` if the state is still what `record` saw.
    pub async fn commit_state(
        &self,
        record: &StateRecord,
        next: TrackingState,
    ) -> Result<TrackingState, StoreError> {
        let next = TrackingState {
            revision: record.state.revision + 1,
            ..next
        };
        let batch = Batch::new()
            .expect(STATE_KEY, record.raw.as_deref())
            .set(STATE_KEY, encode(&next)?);
        self.kv.apply(batch).await?;
        Ok(next)
    }

    /// Clear the visit and, if given, append `shift` to the pending queue in
    /// one atomic write.
    ///
    /// Returns `false` when a shift for the same session is already queued;
    /// the state is still cleared in that case.
    pub async fn commit_finalize(
        &self,
        record: &StateRecord,
        shift: Option<PendingShift>,
        signal_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let cleared = TrackingState {
            revision: record.state.revision + 1,
            ..record.state.cleared().observed(signal_at)
        };
        let mut batch = Batch::new()
            .expect(STATE_KEY, record.raw.as_deref())
            .set(STATE_KEY, encode(&cleared)?);

        let mut enqueued = false;
        if let Some(shift) = shift {
            let pending = self.load_pending().await?;
            let duplicate = shift.session_id.is_some()
                && pending.shifts.iter().any(|s| s.session_id == shift.session_id);
            if !duplicate {
                let mut shifts = pending.shifts;
                shifts.push(shift);
                batch = batch
                    .expect(PENDING_KEY, pending.raw.as_deref())
                    .set(PENDING_KEY, encode(&shifts)?);
                enqueued = true;
            }
        }

        self.kv.apply(batch).await?;
        Ok(enqueued)
    }

    /// Replace the pending queue if it is still what `record` saw.
    pub async fn commit_pending(
        &self,
        record: &PendingRecord,
        shifts: &[PendingShift],
    ) -> Result<(), StoreError> {
        let batch = Batch::new()
            .expect(PENDING_KEY, record.raw.as_deref())
            .set(PENDING_KEY, encode(&shifts)?);
        self.kv.apply(batch).await
    }

    /// Store the site and the state for a new tracking session together.
    pub async fn start_session(
        &self,
        site: &WorkSite,
        record: &StateRecord,
        state: TrackingState,
    ) -> Result<TrackingState, StoreError> {
        let state = TrackingState {
            revision: record.state.revision + 1,
            ..state
        };
        let batch = Batch::new()
            .expect(STATE_KEY, record.raw.as_deref())
            .set(SITE_KEY, encode(site)?)
            .set(STATE_KEY, encode(&state)?);
        self.kv.apply(batch).await?;
        Ok(state)
    }

    /// Drop the site and tracking state. The pending queue is kept.
    pub async fn end_session(&self) -> Result<(), StoreError> {
        self.kv
            .apply(Batch::new().remove(SITE_KEY).remove(STATE_KEY))
            .await
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}
