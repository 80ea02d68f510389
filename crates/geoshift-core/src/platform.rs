//! Collaborators supplied by the host platform.
//!
//! The core never talks to GPS hardware, the notification center or the
//! shift database directly; it goes through these traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{LocationError, PersistenceError};
use crate::events::Notice;
use crate::geo::{Position, WorkSite};
use crate::shift::{ConfirmedShift, StoredShift};

/// Platform location services.
///
/// Boundary events and periodic samples are pushed into
/// [`crate::tracking::Tracker::handle_signal`]; this trait only covers the
/// calls the core makes outward.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Fails with [`LocationError::PermissionDenied`] when foreground or
    /// background location access is missing.
    async fn check_permissions(&self) -> Result<(), LocationError>;

    /// Register the geofence and periodic sampling for `site`.
    async fn start_monitoring(&self, site: &WorkSite) -> Result<(), LocationError>;

    /// Unregister everything registered by `start_monitoring`.
    async fn stop_monitoring(&self) -> Result<(), LocationError>;

    /// A high-accuracy fix no older than `max_age`.
    async fn current_position(&self, max_age: Duration) -> Result<Position, LocationError>;
}

/// Fire-and-forget user notifications. Implementations log their own
/// delivery failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notice: Notice);
}

/// Durable storage for confirmed shifts.
#[async_trait]
pub trait ShiftPersistence: Send + Sync {
    async fn create(
        &self,
        user_id: &str,
        shift: &ConfirmedShift,
    ) -> Result<StoredShift, PersistenceError>;
}

/// Source of "now" for timers and manual exits.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Sink that only logs, for hosts without a notification center.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notice: Notice) {
        tracing::info!(title = notice.title(), body = %notice.body(), "notice");
    }
}
