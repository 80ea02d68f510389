use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shift::PendingShift;

/// Every user-visible outcome of tracking produces a Notice.
/// The notification sink renders them; the confirmation UI reads the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notice {
    /// Entered the geofence; dwell confirmation pending.
    Arrived {
        entered_at: DateTime<Utc>,
    },
    /// Dwell window elapsed while still inside.
    ShiftStarted {
        start_time: DateTime<Utc>,
    },
    /// A finalized shift awaits confirmation.
    ConfirmShift {
        shift: PendingShift,
    },
    /// A finalized shift could not be queued. The payload is the only copy.
    ShiftNotQueued {
        shift: PendingShift,
        reason: String,
    },
    /// Visit shorter than the minimum; nothing was recorded.
    ShiftTooShort {
        duration_minutes: i64,
        min_minutes: i64,
        at: DateTime<Utc>,
    },
    /// A pending shift was stored as a confirmed record.
    ShiftAccepted {
        shift_id: uuid::Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    /// A pending shift was dropped by the user.
    ShiftDiscarded {
        shift_id: uuid::Uuid,
    },
    /// An edited range failed validation.
    EditRejected {
        shift_id: uuid::Uuid,
        reason: String,
    },
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::Arrived { .. } => "Arrived at work",
            Notice::ShiftStarted { .. } => "Shift started",
            Notice::ConfirmShift { .. } => "Confirm your shift",
            Notice::ShiftNotQueued { .. } => "Shift could not be saved",
            Notice::ShiftTooShort { .. } => "Shift not recorded",
            Notice::ShiftAccepted { .. } => "Shift saved",
            Notice::ShiftDiscarded { .. } => "Shift discarded",
            Notice::EditRejected { .. } => "Edit rejected",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notice::Arrived { entered_at } => format!(
                "Tracking since {}. Your shift starts once you have stayed a while.",
                entered_at.format("%H:%M")
            ),
            Notice::ShiftStarted { start_time } => {
                format!("Shift started at {}.", start_time.format("%H:%M"))
            }
            Notice::ConfirmShift { shift } => format!(
                "{} {} - {} ({}h {:02}m). Tap to confirm.",
                shift.date,
                shift.start_time.format("%H:%M"),
                shift.end_time.format("%H:%M"),
                shift.duration_minutes / 60,
                shift.duration_minutes % 60
            ),
            Notice::ShiftNotQueued { shift, reason } => format!(
                "{} {} - {} was not queued ({reason}). Please record it manually.",
                shift.date,
                shift.start_time.format("%H:%M"),
                shift.end_time.format("%H:%M")
            ),
            Notice::ShiftTooShort {
                duration_minutes,
                min_minutes,
                ..
            } => format!(
                "Visit lasted {duration_minutes} minutes, less than {min_minutes}. Not recorded."
            ),
            Notice::ShiftAccepted {
                start_time,
                end_time,
                ..
            } => format!(
                "Saved {} - {}.",
                start_time.format("%H:%M"),
                end_time.format("%H:%M")
            ),
            Notice::ShiftDiscarded { .. } => "The shift was not saved.".to_string(),
            Notice::EditRejected { reason, .. } => reason.clone(),
        }
    }
}
