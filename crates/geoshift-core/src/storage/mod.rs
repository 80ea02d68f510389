mod config;
pub mod geofence;
pub mod kv;
pub mod sqlite;

pub use config::{Config, ShiftsConfig, TrackingConfig, UserConfig};
pub use geofence::{GeofenceStore, PendingRecord, StateRecord, StoreGuard};
pub use kv::{Batch, KeyValueStore, KvOp, MemoryStore};
pub use sqlite::SqliteStore;

use std::path::PathBuf;

/// Returns `~/.config/geoshift[-dev]/` based on GEOSHIFT_ENV.
///
/// Set GEOSHIFT_ENV=dev to use the development data directory, or
/// GEOSHIFT_DATA_DIR to point at an explicit directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("GEOSHIFT_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("GEOSHIFT_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("geoshift-dev")
            } else {
                base_dir.join("geoshift")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
