//! Wiring shared by the subcommands.

use std::sync::Arc;

use geoshift_core::{Config, ConfirmationWorkflow, GeofenceStore, SqliteStore, Tracker};

use crate::adapters::{JsonNotifier, SqliteShifts, StoredLocation};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Everything a command needs, opened from the data directory.
pub struct Context {
    pub config: Config,
    pub store: GeofenceStore,
    pub location: Arc<StoredLocation>,
    pub shifts: Arc<SqliteShifts>,
}

impl Context {
    pub fn open() -> CliResult<Self> {
        let config = Config::load()?;
        let kv = Arc::new(SqliteStore::open_default()?);
        let shifts = Arc::new(SqliteShifts::open_default()?);
        Ok(Self {
            config,
            store: GeofenceStore::new(kv.clone()),
            location: Arc::new(StoredLocation::new(kv)),
            shifts,
        })
    }

    pub fn tracker(&self) -> Tracker {
        Tracker::new(
            self.store.clone(),
            self.location.clone(),
            Arc::new(JsonNotifier),
            self.config.tracker_settings(),
        )
    }

    pub fn workflow(&self) -> ConfirmationWorkflow {
        ConfirmationWorkflow::new(
            self.store.clone(),
            self.shifts.clone(),
            Arc::new(JsonNotifier),
            self.config.user.id.clone(),
            self.config.shifts.min_shift_minutes,
            self.config.utc_offset(),
        )
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
