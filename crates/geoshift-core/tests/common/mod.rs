//! In-memory fakes of every collaborator the core talks to.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use geoshift_core::storage::geofence::PENDING_KEY;
use geoshift_core::storage::{Batch, KvOp};
use geoshift_core::{
    Clock, ConfirmationWorkflow, ConfirmedShift, GeofenceStore, KeyValueStore, LocationError,
    LocationProvider, MemoryStore, NotificationSink, Notice, PersistenceError, Position,
    ShiftFinalizer, ShiftPersistence, StoreError, StoredShift, Tracker, TrackerSettings, WorkSite,
};

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 11, h, m, 0).unwrap()
}

pub fn site() -> WorkSite {
    WorkSite::new(45.0703, 7.6869, 100.0).unwrap()
}

/// A point `meters` north of the site center.
pub fn north_of_site(meters: f64, timestamp: DateTime<Utc>) -> Position {
    let site = site();
    let dlat = meters / 111_195.0;
    Position::new(site.latitude + dlat, site.longitude, timestamp)
}

// ── Location ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeLocation {
    pub deny_permissions: AtomicBool,
    pub monitoring: AtomicBool,
    pub start_calls: AtomicUsize,
    pub fix_requests: AtomicUsize,
    /// Fixes returned by `current_position`, in order. Empty means no fix.
    fixes: Mutex<VecDeque<Position>>,
}

impl FakeLocation {
    pub fn push_fix(&self, position: Position) {
        self.fixes.lock().unwrap().push_back(position);
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn check_permissions(&self) -> Result<(), LocationError> {
        if self.deny_permissions.load(Ordering::SeqCst) {
            return Err(LocationError::PermissionDenied("background".into()));
        }
        Ok(())
    }

    async fn start_monitoring(&self, _site: &WorkSite) -> Result<(), LocationError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.monitoring.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_monitoring(&self) -> Result<(), LocationError> {
        self.monitoring.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn current_position(&self, _max_age: Duration) -> Result<Position, LocationError> {
        self.fix_requests.fetch_add(1, Ordering::SeqCst);
        self.fixes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LocationError::Unavailable("no fix".into()))
    }
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.notices.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ── Persistence ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPersistence {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    stored: Mutex<Vec<StoredShift>>,
}

impl RecordingPersistence {
    pub fn stored(&self) -> Vec<StoredShift> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShiftPersistence for RecordingPersistence {
    async fn create(
        &self,
        _user_id: &str,
        shift: &ConfirmedShift,
    ) -> Result<StoredShift, PersistenceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("offline".into()));
        }
        let stored = StoredShift {
            id: format!("shift-{n}"),
            shift: shift.clone(),
        };
        self.stored.lock().unwrap().push(stored.clone());
        Ok(stored)
    }
}

// ── Clock ────────────────────────────────────────────────────────────

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Memory store whose batches touching the pending queue can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_pending_writes: AtomicBool,
    pub fail_all_writes: AtomicBool,
    /// Number of upcoming pending-queue batches that lose a race: another
    /// writer rewrites the queue just before each of them applies.
    pub pending_races: AtomicUsize,
}

impl FlakyStore {
    fn writes_pending(batch: &Batch) -> bool {
        batch
            .ops
            .iter()
            .any(|op| matches!(op, KvOp::Set { key, .. } if key == PENDING_KEY))
    }

    fn should_fail(&self, batch: &Batch) -> bool {
        if self.fail_all_writes.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_pending_writes.load(Ordering::SeqCst) && Self::writes_pending(batch)
    }

    /// Move the last queued shift to the front, as another device syncing
    /// its queue might.
    async fn rewrite_pending(&self) -> Result<(), StoreError> {
        let raw = self.inner.get(PENDING_KEY).await?;
        let rewritten = match raw {
            Some(json) => {
                let mut entries: Vec<serde_json::Value> = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                entries.rotate_right(1);
                let rotated = serde_json::to_string(&entries)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                // One more leading space each time, so even a queue of one
                // never reads back the same bytes.
                let pad = json.len() - json.trim_start().len() + 1;
                format!("{}{rotated}", " ".repeat(pad))
            }
            None => "[]".to_string(),
        };
        self.inner.set(PENDING_KEY, &rewritten).await
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }

    async fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        if self.should_fail(&batch) {
            return Err(StoreError::Backend("disk full".into()));
        }
        if Self::writes_pending(&batch)
            && self
                .pending_races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.rewrite_pending().await?;
        }
        self.inner.apply(batch).await
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub kv: Arc<FlakyStore>,
    pub store: GeofenceStore,
    pub location: Arc<FakeLocation>,
    pub notifier: Arc<RecordingNotifier>,
    pub persistence: Arc<RecordingPersistence>,
    pub clock: Arc<ManualClock>,
    pub tracker: Tracker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(TrackerSettings::default())
    }

    pub fn with_settings(settings: TrackerSettings) -> Self {
        let kv = Arc::new(FlakyStore::default());
        let store = GeofenceStore::new(kv.clone());
        let location = Arc::new(FakeLocation::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let persistence = Arc::new(RecordingPersistence::default());
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let tracker = Tracker::with_clock(
            store.clone(),
            location.clone(),
            notifier.clone(),
            settings,
            clock.clone(),
        );
        Self {
            kv,
            store,
            location,
            notifier,
            persistence,
            clock,
            tracker,
        }
    }

    pub fn workflow(&self) -> ConfirmationWorkflow {
        ConfirmationWorkflow::new(
            self.store.clone(),
            self.persistence.clone(),
            self.notifier.clone(),
            "user-1",
            15,
            ShiftFinalizer::default().offset,
        )
    }
}

/// Let spawned tasks run to completion on the current-thread runtime.
pub async fn drain_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
