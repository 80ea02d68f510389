//! Entry/exit detector.
//!
//! A persisted state machine driven by platform signals. It holds no visit
//! state in memory: every handler takes the store gate, re-reads the site and
//! tracking state, decides, and commits.
//!
//! ## State Transitions
//!
//! ```text
//! Outside --enter/inside sample--> EnteredUnconfirmed --dwell, inside--> AtWork
//!    ^                                  |                                  |
//!    +------ dwell, outside (finalize) -+                                  |
//!    +------------ validated exit or exit-buffer sample (finalize) --------+
//! ```
//!
//! Exits are validated against a fresh fix with a wider radius
//! (`exit_buffer_factor`). A fix that cannot be obtained accepts the exit so
//! tracking cannot get stuck at work.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::signal::{BoundaryKind, IgnoreReason, LocationSignal, SignalOutcome};
use super::state::{Phase, TrackingStatus};
use crate::error::{CoreError, LocationError, Result, StoreError};
use crate::events::Notice;
use crate::geo::{Position, WorkSite};
use crate::platform::{Clock, LocationProvider, NotificationSink, SystemClock};
use crate::shift::{FinalizeOutcome, PendingShift, ShiftFinalizer};
use crate::storage::{GeofenceStore, StateRecord, StoreGuard};
use crate::tracking::TrackingState;

/// Runtime knobs of the detector.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// How long an entry must hold before it counts as arrival.
    pub dwell: chrono::Duration,
    /// Radius multiplier an exit must exceed.
    pub exit_buffer_factor: f64,
    /// Maximum age of the fix used to validate exits and dwell.
    pub fresh_position_max_age: Duration,
    /// Samples reporting a worse accuracy are ignored.
    pub max_sample_accuracy_meters: Option<f64>,
    pub finalizer: ShiftFinalizer,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            dwell: chrono::Duration::minutes(15),
            exit_buffer_factor: 1.2,
            fresh_position_max_age: Duration::from_secs(30),
            max_sample_accuracy_meters: Some(100.0),
            finalizer: ShiftFinalizer::default(),
        }
    }
}

/// Tries at the finalize commit before the shift is handed to the user.
const FINALIZE_ATTEMPTS: u32 = 3;

struct DwellTimer {
    session_id: Uuid,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SessionControl {
    /// Bumped by `stop_tracking`; timers from older generations do nothing.
    generation: u64,
    dwell: Option<DwellTimer>,
}

struct Inner {
    store: GeofenceStore,
    location: Arc<dyn LocationProvider>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    control: Mutex<SessionControl>,
}

/// Handle to the detector. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

impl Tracker {
    pub fn new(
        store: GeofenceStore,
        location: Arc<dyn LocationProvider>,
        notifier: Arc<dyn NotificationSink>,
        settings: TrackerSettings,
    ) -> Self {
        Self::with_clock(store, location, notifier, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: GeofenceStore,
        location: Arc<dyn LocationProvider>,
        notifier: Arc<dyn NotificationSink>,
        settings: TrackerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                location,
                notifier,
                clock,
                settings,
                control: Mutex::new(SessionControl::default()),
            }),
        }
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Begin tracking `site`.
    ///
    /// Permission problems are returned before anything is written. If a
    /// session is already running only the site is replaced; an open visit
    /// carries over.
    pub async fn start_tracking(&self, site: WorkSite) -> Result<()> {
        site.validate()?;
        self.inner.location.check_permissions().await?;

        let guard = self.inner.store.lock().await;
        let record = guard.load_state().await?;
        let previous_site = guard.load_site().await?;

        self.inner.location.start_monitoring(&site).await?;

        let state = if previous_site.is_some() {
            record.state.clone()
        } else {
            TrackingState::default()
        };
        let state = match guard.start_session(&site, &record, state).await {
            Ok(state) => state,
            Err(e) => {
                if previous_site.is_none() {
                    if let Err(stop_err) = self.inner.location.stop_monitoring().await {
                        warn!(error = %stop_err, "failed to unregister after aborted start");
                    }
                }
                return Err(e.into());
            }
        };

        info!(
            latitude = site.latitude,
            longitude = site.longitude,
            radius_meters = site.radius_meters,
            replaced = previous_site.is_some(),
            "tracking started"
        );

        if state.phase() == Phase::EnteredUnconfirmed {
            if let (Some(session_id), Some(entered_at)) = (state.session_id, state.entered_at) {
                self.schedule_dwell(session_id, entered_at);
            }
        }
        Ok(())
    }

    /// Stop tracking: unregister listeners, cancel timers, clear the site and
    /// tracking state. Pending shifts are kept.
    pub async fn stop_tracking(&self) -> Result<()> {
        if let Err(e) = self.inner.location.stop_monitoring().await {
            warn!(error = %e, "failed to unregister location listeners");
        }
        {
            let mut control = self.control();
            control.generation += 1;
            if let Some(timer) = control.dwell.take() {
                timer.handle.abort();
            }
        }

        let guard = self.inner.store.lock().await;
        guard.end_session().await?;
        info!("tracking stopped");
        Ok(())
    }

    pub async fn is_tracking(&self) -> Result<bool> {
        let guard = self.inner.store.lock().await;
        Ok(guard.load_site().await?.is_some())
    }

    pub async fn tracking_status(&self) -> Result<TrackingStatus> {
        let guard = self.inner.store.lock().await;
        let site = guard.load_site().await?;
        let record = guard.load_state().await?;
        Ok(TrackingStatus::new(&record.state, site))
    }

    // ── Signals ──────────────────────────────────────────────────────

    /// Apply one platform signal. Never fails; errors are logged and the
    /// signal is reported as dropped.
    pub async fn handle_signal(&self, signal: LocationSignal) -> SignalOutcome {
        let outcome = self.process_signal(&signal).await;
        self.settle("signal", outcome)
    }

    /// Manual exit at the current time, skipping validation.
    pub async fn force_exit(&self) -> Result<SignalOutcome> {
        let guard = self.inner.store.lock().await;
        if guard.load_site().await?.is_none() {
            return Err(CoreError::NotTracking);
        }
        let record = guard.load_state().await?;
        if record.state.phase() == Phase::Outside {
            return Ok(SignalOutcome::ignored(IgnoreReason::NotAtWork));
        }
        let now = self.inner.clock.now();
        info!(exit_at = %now, "forced exit");
        self.finalize_visit(&guard, &record, now, None).await
    }

    /// Run the dwell check now if the window has already elapsed.
    ///
    /// Covers hosts where the in-process timer does not survive, such as a
    /// CLI invoked once per signal.
    pub async fn check_dwell(&self) -> SignalOutcome {
        let outcome = self.run_dwell_check(None).await;
        self.settle("dwell check", outcome)
    }

    async fn process_signal(&self, signal: &LocationSignal) -> Result<SignalOutcome> {
        let guard = self.inner.store.lock().await;
        let Some(site) = guard.load_site().await? else {
            debug!(?signal, "signal while not tracking");
            return Ok(SignalOutcome::NotTracking);
        };
        let record = guard.load_state().await?;

        if record.state.is_stale(signal.at()) {
            debug!(at = %signal.at(), "stale signal");
            return Ok(SignalOutcome::ignored(IgnoreReason::StaleSignal));
        }

        match signal {
            LocationSignal::Boundary {
                kind: BoundaryKind::Enter,
                at,
            } => self.on_enter(&guard, &record, *at).await,
            LocationSignal::Boundary {
                kind: BoundaryKind::Exit,
                at,
            } => {
                if record.state.phase() == Phase::Outside {
                    return Ok(SignalOutcome::ignored(IgnoreReason::NotAtWork));
                }
                self.validate_exit(&guard, &site, &record, *at).await
            }
            LocationSignal::Sample { position } => {
                self.on_sample(&guard, &site, &record, position).await
            }
        }
    }

    async fn on_enter(
        &self,
        guard: &StoreGuard<'_>,
        record: &StateRecord,
        at: DateTime<Utc>,
    ) -> Result<SignalOutcome> {
        if record.state.phase() != Phase::Outside {
            return Ok(SignalOutcome::ignored(IgnoreReason::AlreadyInside));
        }

        let session_id = Uuid::new_v4();
        // A failed write aborts the entry before any notice goes out.
        guard
            .commit_state(record, record.state.entered(at, session_id))
            .await?;

        info!(%session_id, entered_at = %at, "entered work site");
        self.inner
            .notifier
            .notify(Notice::Arrived { entered_at: at })
            .await;
        self.schedule_dwell(session_id, at);

        Ok(SignalOutcome::Entered {
            session_id,
            entered_at: at,
        })
    }

    async fn on_sample(
        &self,
        guard: &StoreGuard<'_>,
        site: &WorkSite,
        record: &StateRecord,
        position: &Position,
    ) -> Result<SignalOutcome> {
        let settings = &self.inner.settings;
        if let (Some(accuracy), Some(limit)) = (position.accuracy, settings.max_sample_accuracy_meters) {
            if accuracy > limit {
                debug!(accuracy, limit, "sample too inaccurate");
                return Ok(SignalOutcome::ignored(IgnoreReason::InaccurateSample));
            }
        }

        let distance = site.distance_to(position);
        match record.state.phase() {
            Phase::Outside if distance <= site.radius_meters => {
                self.on_enter(guard, record, position.timestamp).await
            }
            Phase::Outside => Ok(SignalOutcome::ignored(IgnoreReason::StillOutside)),
            Phase::EnteredUnconfirmed => match self.dwell_deadline(&record.state) {
                Some(deadline) if position.timestamp >= deadline => {
                    debug!("dwell window elapsed without timer, resolving from sample");
                    let at = position.timestamp;
                    self.resolve_dwell(guard, site, record, Ok(*position), at, Some(at))
                        .await
                }
                _ => Ok(SignalOutcome::ignored(IgnoreReason::AwaitingDwell)),
            },
            Phase::AtWork if distance > site.radius_meters * settings.exit_buffer_factor => {
                debug!(distance, "sample beyond exit buffer");
                self.validate_exit(guard, site, record, position.timestamp).await
            }
            Phase::AtWork => Ok(SignalOutcome::ignored(IgnoreReason::WithinGeofence)),
        }
    }

    /// Confirm an exit against a fresh fix before finalizing.
    async fn validate_exit(
        &self,
        guard: &StoreGuard<'_>,
        site: &WorkSite,
        record: &StateRecord,
        exit_at: DateTime<Utc>,
    ) -> Result<SignalOutcome> {
        let settings = &self.inner.settings;
        match self
            .inner
            .location
            .current_position(settings.fresh_position_max_age)
            .await
        {
            Ok(fix) if site.contains(&fix, settings.exit_buffer_factor) => {
                let distance = site.distance_to(&fix);
                info!(distance, "exit not confirmed by fresh fix, staying at work");
                return Ok(SignalOutcome::ExitRejected {
                    distance_meters: distance,
                });
            }
            Ok(fix) => debug!(distance = site.distance_to(&fix), "exit confirmed"),
            Err(e) => warn!(error = %e, "exit validation fix unavailable, accepting exit"),
        }
        self.finalize_visit(guard, record, exit_at, Some(exit_at)).await
    }

    // ── Dwell ────────────────────────────────────────────────────────

    fn dwell_deadline(&self, state: &TrackingState) -> Option<DateTime<Utc>> {
        state.entered_at.map(|at| at + self.inner.settings.dwell)
    }

    fn schedule_dwell(&self, session_id: Uuid, entered_at: DateTime<Utc>) {
        let deadline = entered_at + self.inner.settings.dwell;
        let delay = (deadline - self.inner.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let mut control = self.control();
        let generation = control.generation;
        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = tracker.run_dwell_check(Some((generation, session_id))).await;
            tracker.settle("dwell timer", outcome);
        });
        if let Some(previous) = control.dwell.replace(DwellTimer { session_id, handle }) {
            previous.handle.abort();
        }
        debug!(%session_id, ?delay, "dwell check scheduled");
    }

    /// `timer` is `(generation, session)` when called from the scheduled task.
    async fn run_dwell_check(&self, timer: Option<(u64, Uuid)>) -> Result<SignalOutcome> {
        let guard = self.inner.store.lock().await;

        if let Some((generation, session_id)) = timer {
            let mut control = self.control();
            // Detach our own handle so later cancellation cannot abort us
            // half way through.
            if control
                .dwell
                .as_ref()
                .is_some_and(|t| t.session_id == session_id)
            {
                control.dwell = None;
            }
            if control.generation != generation {
                return Ok(SignalOutcome::ignored(IgnoreReason::SessionChanged));
            }
        }

        let Some(site) = guard.load_site().await? else {
            return Ok(SignalOutcome::NotTracking);
        };
        let record = guard.load_state().await?;
        if record.state.phase() != Phase::EnteredUnconfirmed {
            return Ok(SignalOutcome::ignored(IgnoreReason::SessionChanged));
        }
        if let Some((_, session_id)) = timer {
            if record.state.session_id != Some(session_id) {
                return Ok(SignalOutcome::ignored(IgnoreReason::SessionChanged));
            }
        }

        let now = self.inner.clock.now();
        if self.dwell_deadline(&record.state).is_some_and(|d| now < d) {
            return Ok(SignalOutcome::ignored(IgnoreReason::AwaitingDwell));
        }

        let fix = self
            .inner
            .location
            .current_position(self.inner.settings.fresh_position_max_age)
            .await;
        self.resolve_dwell(&guard, &site, &record, fix, now, None).await
    }

    /// `signal_at` is set when a sample, rather than the timer, triggered
    /// the check.
    async fn resolve_dwell(
        &self,
        guard: &StoreGuard<'_>,
        site: &WorkSite,
        record: &StateRecord,
        fix: std::result::Result<Position, LocationError>,
        now: DateTime<Utc>,
        signal_at: Option<DateTime<Utc>>,
    ) -> Result<SignalOutcome> {
        match fix {
            Ok(position) if site.contains(&position, 1.0) => {
                self.confirm_arrival(guard, record, signal_at).await
            }
            Ok(position) => {
                info!(
                    distance = site.distance_to(&position),
                    "left before the dwell window elapsed"
                );
                self.finalize_visit(guard, record, now, signal_at).await
            }
            Err(e) => {
                warn!(error = %e, "dwell recheck fix unavailable, keeping arrival");
                self.confirm_arrival(guard, record, signal_at).await
            }
        }
    }

    async fn confirm_arrival(
        &self,
        guard: &StoreGuard<'_>,
        record: &StateRecord,
        signal_at: Option<DateTime<Utc>>,
    ) -> Result<SignalOutcome> {
        let committed = guard
            .commit_state(record, record.state.confirmed().observed(signal_at))
            .await?;
        self.cancel_dwell();

        let Some(start_time) = committed.entered_at else {
            return Ok(SignalOutcome::ignored(IgnoreReason::SessionChanged));
        };
        info!(%start_time, "arrival confirmed");
        self.inner
            .notifier
            .notify(Notice::ShiftStarted { start_time })
            .await;
        Ok(SignalOutcome::Confirmed { start_time })
    }

    // ── Finalize ─────────────────────────────────────────────────────

    /// Round, enqueue and clear in one commit, then notify.
    ///
    /// A commit that loses a race with another writer is retried against
    /// fresh reads. If it still fails, the shift goes out in a
    /// [`Notice::ShiftNotQueued`] and the state is cleared on its own, so a
    /// broken queue cannot keep the user "at work" forever.
    async fn finalize_visit(
        &self,
        guard: &StoreGuard<'_>,
        record: &StateRecord,
        exit_at: DateTime<Utc>,
        signal_at: Option<DateTime<Utc>>,
    ) -> Result<SignalOutcome> {
        let Some(entered_at) = record.state.entered_at else {
            return Ok(SignalOutcome::ignored(IgnoreReason::NotAtWork));
        };
        self.cancel_dwell();

        let finalizer = &self.inner.settings.finalizer;
        let mut outcome = finalizer.finalize(entered_at, exit_at);
        if let FinalizeOutcome::Pending(shift) = &mut outcome {
            shift.session_id = record.state.session_id;
        }
        let shift = match &outcome {
            FinalizeOutcome::Pending(shift) => Some(shift.clone()),
            FinalizeOutcome::Discarded { .. } => None,
        };

        let mut current = record.clone();
        let mut attempt = 1;
        let enqueued = loop {
            let err = match guard
                .commit_finalize(&current, shift.clone(), signal_at)
                .await
            {
                Ok(enqueued) => break enqueued,
                Err(e) => e,
            };
            if matches!(err, StoreError::Conflict { .. }) && attempt < FINALIZE_ATTEMPTS {
                warn!(error = %err, attempt, "finalize lost a race, retrying");
                let fresh = match guard.load_state().await {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        return Err(self
                            .abandon_finalize(guard, &current, shift, signal_at, e)
                            .await)
                    }
                };
                if fresh.state.session_id == record.state.session_id {
                    current = fresh;
                    attempt += 1;
                    continue;
                }
                // Another writer already closed this visit.
                let queued = match &shift {
                    Some(shift) => guard.load_pending().await.is_ok_and(|pending| {
                        pending
                            .shifts
                            .iter()
                            .any(|s| s.session_id == shift.session_id)
                    }),
                    None => true,
                };
                if queued {
                    info!("visit closed by another writer");
                    return Ok(SignalOutcome::ignored(IgnoreReason::AlreadyFinalized));
                }
            }
            return Err(self
                .abandon_finalize(guard, &current, shift, signal_at, err)
                .await);
        };

        match &outcome {
            FinalizeOutcome::Pending(shift) if enqueued => {
                info!(
                    shift_id = %shift.id,
                    start = %shift.start_time,
                    end = %shift.end_time,
                    minutes = shift.duration_minutes,
                    "shift pending confirmation"
                );
                self.inner
                    .notifier
                    .notify(Notice::ConfirmShift {
                        shift: shift.clone(),
                    })
                    .await;
            }
            FinalizeOutcome::Pending(_) => {
                info!("shift for this visit already queued");
                return Ok(SignalOutcome::ignored(IgnoreReason::AlreadyFinalized));
            }
            FinalizeOutcome::Discarded {
                duration_minutes, ..
            } => {
                info!(minutes = duration_minutes, "visit too short, not recorded");
                self.inner
                    .notifier
                    .notify(Notice::ShiftTooShort {
                        duration_minutes: *duration_minutes,
                        min_minutes: finalizer.min_shift_minutes,
                        at: exit_at,
                    })
                    .await;
            }
        }

        Ok(SignalOutcome::Finalized { result: outcome })
    }

    /// Last resort after a failed finalize commit: hand the shift to the
    /// user and clear the visit if the state is still ours.
    async fn abandon_finalize(
        &self,
        guard: &StoreGuard<'_>,
        record: &StateRecord,
        shift: Option<PendingShift>,
        signal_at: Option<DateTime<Utc>>,
        err: StoreError,
    ) -> CoreError {
        error!(error = %err, shift = ?shift, "failed to finalize visit");
        if let Some(shift) = shift {
            self.inner
                .notifier
                .notify(Notice::ShiftNotQueued {
                    shift,
                    reason: err.to_string(),
                })
                .await;
        }
        if let Err(clear_err) = guard
            .commit_state(record, record.state.cleared().observed(signal_at))
            .await
        {
            error!(error = %clear_err, "failed to clear tracking state");
        }
        err.into()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn control(&self) -> MutexGuard<'_, SessionControl> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_dwell(&self) {
        if let Some(timer) = self.control().dwell.take() {
            timer.handle.abort();
        }
    }

    fn settle(&self, source: &str, outcome: Result<SignalOutcome>) -> SignalOutcome {
        match outcome {
            Ok(outcome) => {
                debug!(source, ?outcome, "handled");
                outcome
            }
            Err(e) => {
                warn!(source, error = %e, "dropping signal");
                SignalOutcome::Dropped {
                    reason: e.to_string(),
                }
            }
        }
    }
}
