//! Geofence entry/exit detection.

mod detector;
mod signal;
mod state;

pub use detector::{Tracker, TrackerSettings};
pub use signal::{BoundaryKind, IgnoreReason, LocationSignal, SignalOutcome};
pub use state::{ConfirmedStart, Phase, TrackingState, TrackingStatus};
