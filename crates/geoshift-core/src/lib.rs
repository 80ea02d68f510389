//! # Geoshift Core Library
//!
//! Core logic for geofence-based shift detection. The host platform feeds
//! boundary crossings and position samples in; the library decides when the
//! user arrived at and left the work site, rounds the visit into a shift and
//! queues it for the user to confirm, edit or discard.
//!
//! ## Architecture
//!
//! - **Tracking**: A persisted state machine (`Outside`, `EnteredUnconfirmed`,
//!   `AtWork`) with a dwell timer and fresh-fix exit validation
//! - **Shifts**: Half-hour rounding, minimum-duration filtering and the
//!   confirmation workflow over the pending queue
//! - **Storage**: A key-value store (SQLite or in-memory) for tracking state
//!   and the pending queue, plus TOML configuration
//! - **Platform**: Traits for location services, notifications and the
//!   shift persistence service
//!
//! ## Key Components
//!
//! - [`Tracker`]: Entry/exit detector
//! - [`ShiftFinalizer`]: Visit to pending shift
//! - [`ConfirmationWorkflow`]: Accept, edit and discard pending shifts
//! - [`GeofenceStore`]: Serialized access to persisted state
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod geo;
pub mod platform;
pub mod rounding;
pub mod shift;
pub mod storage;
pub mod tracking;

pub use error::{
    ConfigError, CoreError, LocationError, PersistenceError, Result, StoreError, ValidationError,
};
pub use events::Notice;
pub use geo::{distance_meters, Position, WorkSite};
pub use platform::{Clock, LocationProvider, LogNotifier, NotificationSink, ShiftPersistence, SystemClock};
pub use rounding::RoundingPolicy;
pub use shift::{
    ConfirmationWorkflow, ConfirmedShift, FinalizeOutcome, PendingShift, ShiftDraft,
    ShiftFinalizer, StoredShift,
};
pub use storage::{Config, GeofenceStore, KeyValueStore, MemoryStore, SqliteStore};
pub use tracking::{
    IgnoreReason, LocationSignal, Phase, SignalOutcome, Tracker, TrackerSettings, TrackingState,
    TrackingStatus,
};
