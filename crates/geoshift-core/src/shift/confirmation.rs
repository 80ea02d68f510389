//! Accept, edit or discard pending shifts.
//!
//! Each operation holds the store gate from reading the queue until the
//! queue is rewritten, so an index cannot shift underneath it. Persistence
//! happens before removal; a persistence failure leaves the queue untouched.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{local_date, validate_range, ConfirmedShift, PendingShift, StoredShift};
use crate::error::{Result, StoreError, ValidationError};
use crate::events::Notice;
use crate::platform::{NotificationSink, ShiftPersistence};
use crate::storage::{GeofenceStore, PendingRecord, StoreGuard};

/// Tries at removing an accepted shift from a queue other writers share.
const DEQUEUE_ATTEMPTS: u32 = 3;

/// Editable copy of a pending shift, bound to its position in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftDraft {
    pub index: usize,
    pub shift_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ShiftDraft {
    pub fn set_start(&mut self, start: DateTime<Utc>) {
        self.start_time = start;
    }

    pub fn set_end(&mut self, end: DateTime<Utc>) {
        self.end_time = end;
    }

    pub fn validate(&self, min_minutes: i64) -> Result<i64, ValidationError> {
        validate_range(self.start_time, self.end_time, min_minutes)
    }
}

pub struct ConfirmationWorkflow {
    store: GeofenceStore,
    persistence: Arc<dyn ShiftPersistence>,
    notifier: Arc<dyn NotificationSink>,
    user_id: String,
    min_shift_minutes: i64,
    offset: FixedOffset,
}

impl ConfirmationWorkflow {
    pub fn new(
        store: GeofenceStore,
        persistence: Arc<dyn ShiftPersistence>,
        notifier: Arc<dyn NotificationSink>,
        user_id: impl Into<String>,
        min_shift_minutes: i64,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            persistence,
            notifier,
            user_id: user_id.into(),
            min_shift_minutes,
            offset,
        }
    }

    /// Pending shifts, oldest first.
    pub async fn list(&self) -> Result<Vec<PendingShift>> {
        let guard = self.store.lock().await;
        Ok(guard.load_pending().await?.shifts)
    }

    /// Position of the shift with `id`, if still pending.
    pub async fn find_index(&self, id: Uuid) -> Result<Option<usize>> {
        Ok(self.list().await?.iter().position(|s| s.id == id))
    }

    /// Store the shift at `index` as-is and remove it from the queue.
    pub async fn accept(&self, index: usize) -> Result<StoredShift> {
        let guard = self.store.lock().await;
        let record = guard.load_pending().await?;
        let shift = pending_at(&record, index)?;
        let confirmed = shift.to_confirmed(&self.user_id);
        self.store_and_remove(&guard, &record, index, confirmed).await
    }

    /// Start editing the shift at `index`.
    pub async fn edit(&self, index: usize) -> Result<ShiftDraft> {
        let guard = self.store.lock().await;
        let record = guard.load_pending().await?;
        let shift = pending_at(&record, index)?;
        Ok(ShiftDraft {
            index,
            shift_id: shift.id,
            start_time: shift.start_time,
            end_time: shift.end_time,
        })
    }

    /// Validate and accept an edited draft.
    ///
    /// Fails with [`ValidationError::StaleIndex`] if the queue changed so that
    /// the draft's shift is no longer at its index.
    pub async fn save(&self, draft: &ShiftDraft) -> Result<StoredShift> {
        let minutes = match draft.validate(self.min_shift_minutes) {
            Ok(minutes) => minutes,
            Err(e) => {
                info!(shift_id = %draft.shift_id, reason = %e, "edit rejected");
                self.notifier
                    .notify(Notice::EditRejected {
                        shift_id: draft.shift_id,
                        reason: e.to_string(),
                    })
                    .await;
                return Err(e.into());
            }
        };

        let guard = self.store.lock().await;
        let record = guard.load_pending().await?;
        let shift = pending_at(&record, draft.index)?;
        if shift.id != draft.shift_id {
            return Err(ValidationError::StaleIndex {
                id: draft.shift_id,
                index: draft.index,
            }
            .into());
        }

        let confirmed = ConfirmedShift {
            user_id: self.user_id.clone(),
            start_time: draft.start_time,
            end_time: draft.end_time,
            duration_minutes: minutes,
            date: local_date(draft.start_time, &self.offset),
        };
        self.store_and_remove(&guard, &record, draft.index, confirmed)
            .await
    }

    /// `edit` + `save` in one call.
    pub async fn edit_and_accept(
        &self,
        index: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<StoredShift> {
        let mut draft = self.edit(index).await?;
        draft.set_start(start);
        draft.set_end(end);
        self.save(&draft).await
    }

    /// Remove the shift at `index` without storing it.
    pub async fn discard(&self, index: usize) -> Result<PendingShift> {
        let guard = self.store.lock().await;
        let record = guard.load_pending().await?;
        let shift = pending_at(&record, index)?.clone();

        let mut shifts = record.shifts.clone();
        shifts.remove(index);
        guard.commit_pending(&record, &shifts).await?;

        info!(shift_id = %shift.id, "pending shift discarded");
        self.notifier
            .notify(Notice::ShiftDiscarded { shift_id: shift.id })
            .await;
        Ok(shift)
    }

    async fn store_and_remove(
        &self,
        guard: &StoreGuard<'_>,
        record: &PendingRecord,
        index: usize,
        confirmed: ConfirmedShift,
    ) -> Result<StoredShift> {
        let shift_id = record.shifts[index].id;
        let stored = match self.persistence.create(&self.user_id, &confirmed).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(%shift_id, error = %e, "persisting shift failed, keeping it pending");
                return Err(e.into());
            }
        };

        if let Err(e) = dequeue(guard, record, index).await {
            // The record exists now; the pending entry stays and may be
            // accepted again.
            error!(%shift_id, stored_id = %stored.id, error = %e, "stored shift but failed to dequeue it");
            return Err(e);
        }

        info!(%shift_id, stored_id = %stored.id, "shift confirmed");
        self.notifier
            .notify(Notice::ShiftAccepted {
                shift_id,
                start_time: confirmed.start_time,
                end_time: confirmed.end_time,
            })
            .await;
        Ok(stored)
    }
}

/// Remove the shift at `index`. If another writer changed the queue in the
/// meantime, the shift is looked up again by id.
async fn dequeue(guard: &StoreGuard<'_>, record: &PendingRecord, index: usize) -> Result<()> {
    let shift_id = record.shifts[index].id;
    let mut current = record.clone();
    let mut position = index;
    let mut attempt = 1;
    loop {
        let mut shifts = current.shifts.clone();
        shifts.remove(position);
        match guard.commit_pending(&current, &shifts).await {
            Ok(()) => return Ok(()),
            Err(e @ StoreError::Conflict { .. }) if attempt < DEQUEUE_ATTEMPTS => {
                warn!(%shift_id, attempt, error = %e, "pending queue changed, retrying by id");
                current = guard.load_pending().await?;
                position = current
                    .shifts
                    .iter()
                    .position(|s| s.id == shift_id)
                    .ok_or(e)?;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn pending_at(record: &PendingRecord, index: usize) -> Result<&PendingShift, ValidationError> {
    record
        .shifts
        .get(index)
        .ok_or_else(|| ValidationError::OutOfBounds {
            collection: "pending shifts".into(),
            index,
            len: record.shifts.len(),
        })
}
