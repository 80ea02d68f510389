use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Position;
use crate::shift::FinalizeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Enter,
    Exit,
}

/// Input delivered by the platform, possibly late, duplicated or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationSignal {
    /// Platform geofence crossing.
    Boundary {
        kind: BoundaryKind,
        at: DateTime<Utc>,
    },
    /// Periodic position sample.
    Sample { position: Position },
}

impl LocationSignal {
    pub fn enter(at: DateTime<Utc>) -> Self {
        LocationSignal::Boundary {
            kind: BoundaryKind::Enter,
            at,
        }
    }

    pub fn exit(at: DateTime<Utc>) -> Self {
        LocationSignal::Boundary {
            kind: BoundaryKind::Exit,
            at,
        }
    }

    pub fn sample(position: Position) -> Self {
        LocationSignal::Sample { position }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            LocationSignal::Boundary { at, .. } => *at,
            LocationSignal::Sample { position } => position.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Enter while a visit is already open.
    AlreadyInside,
    /// Exit with no open visit.
    NotAtWork,
    /// Sample outside the geofence while outside.
    StillOutside,
    /// Sample within the buffered radius while at work.
    WithinGeofence,
    /// Sample during the dwell window.
    AwaitingDwell,
    /// Signal older than the newest applied one.
    StaleSignal,
    /// Sample accuracy worse than the configured limit.
    InaccurateSample,
    /// Timer fired for a session that no longer exists.
    SessionChanged,
    /// The visit's shift is already queued.
    AlreadyFinalized,
}

/// What a signal did. Handlers report failures here instead of returning errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignalOutcome {
    NotTracking,
    Ignored {
        reason: IgnoreReason,
    },
    Entered {
        session_id: Uuid,
        entered_at: DateTime<Utc>,
    },
    Confirmed {
        start_time: DateTime<Utc>,
    },
    /// Fresh fix put the user back inside; nothing changed.
    ExitRejected {
        distance_meters: f64,
    },
    Finalized {
        result: FinalizeOutcome,
    },
    /// The signal failed and was dropped.
    Dropped {
        reason: String,
    },
}

impl SignalOutcome {
    pub(crate) fn ignored(reason: IgnoreReason) -> Self {
        SignalOutcome::Ignored { reason }
    }
}
