//! Platform collaborators for a command-line host.
//!
//! There is no GPS here: positions arrive through `geoshift signal position`
//! and the most recent one is kept as the "current" fix.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use geoshift_core::storage::data_dir;
use geoshift_core::{
    ConfirmedShift, KeyValueStore, LocationError, LocationProvider, NotificationSink, Notice,
    PersistenceError, Position, ShiftPersistence, SqliteStore, StoredShift, WorkSite,
};

const LAST_POSITION_KEY: &str = "cli.last_position";

/// Location provider backed by the last reported position.
pub struct StoredLocation {
    kv: Arc<SqliteStore>,
}

impl StoredLocation {
    pub fn new(kv: Arc<SqliteStore>) -> Self {
        Self { kv }
    }

    pub async fn record(&self, position: &Position) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(position)?;
        self.kv.set(LAST_POSITION_KEY, &json).await?;
        Ok(())
    }
}

#[async_trait]
impl LocationProvider for StoredLocation {
    async fn check_permissions(&self) -> Result<(), LocationError> {
        Ok(())
    }

    async fn start_monitoring(&self, site: &WorkSite) -> Result<(), LocationError> {
        debug!(?site, "monitoring via reported positions");
        Ok(())
    }

    async fn stop_monitoring(&self) -> Result<(), LocationError> {
        Ok(())
    }

    async fn current_position(&self, max_age: Duration) -> Result<Position, LocationError> {
        let json = self
            .kv
            .get(LAST_POSITION_KEY)
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?
            .ok_or_else(|| LocationError::Unavailable("no position reported yet".into()))?;
        let position: Position =
            serde_json::from_str(&json).map_err(|e| LocationError::Unavailable(e.to_string()))?;

        let age = (Utc::now() - position.timestamp).to_std().unwrap_or(Duration::ZERO);
        if age > max_age {
            return Err(LocationError::Unavailable(format!(
                "last position is {}s old",
                age.as_secs()
            )));
        }
        Ok(position)
    }
}

/// Prints every notice to stderr as one JSON line.
pub struct JsonNotifier;

#[async_trait]
impl NotificationSink for JsonNotifier {
    async fn notify(&self, notice: Notice) {
        match serde_json::to_string(&notice) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => warn!(error = %e, title = notice.title(), "failed to render notice"),
        }
    }
}

/// Confirmed shifts in the `shifts` table of the CLI database.
pub struct SqliteShifts {
    conn: Mutex<Connection>,
}

impl SqliteShifts {
    pub fn open_default() -> Result<Self, Box<dyn std::error::Error>> {
        Self::open(data_dir()?.join("geoshift.db"))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS shifts (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                start_time       TEXT NOT NULL,
                end_time         TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                date             TEXT NOT NULL,
                created_at       TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn list(&self) -> Result<Vec<StoredShift>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().map_err(|_| "shift database poisoned")?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, start_time, end_time, duration_minutes, date
             FROM shifts ORDER BY start_time",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut shifts = Vec::new();
        for row in rows {
            let (id, user_id, start, end, duration_minutes, date) = row?;
            shifts.push(StoredShift {
                id,
                shift: ConfirmedShift {
                    user_id,
                    start_time: start.parse::<DateTime<Utc>>()?,
                    end_time: end.parse::<DateTime<Utc>>()?,
                    duration_minutes,
                    date: date.parse::<NaiveDate>()?,
                },
            });
        }
        Ok(shifts)
    }
}

#[async_trait]
impl ShiftPersistence for SqliteShifts {
    async fn create(
        &self,
        user_id: &str,
        shift: &ConfirmedShift,
    ) -> Result<StoredShift, PersistenceError> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self
            .conn
            .lock()
            .map_err(|_| PersistenceError::Unavailable("shift database poisoned".into()))?;
        conn.execute(
            "INSERT INTO shifts (id, user_id, start_time, end_time, duration_minutes, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                user_id,
                shift.start_time.to_rfc3339(),
                shift.end_time.to_rfc3339(),
                shift.duration_minutes,
                shift.date.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| PersistenceError::Rejected(e.to_string()))?;

        Ok(StoredShift {
            id,
            shift: ConfirmedShift {
                user_id: user_id.to_string(),
                ..shift.clone()
            },
        })
    }
}
