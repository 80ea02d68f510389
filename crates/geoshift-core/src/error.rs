//! Core error types for geoshift-core.
//!
//! This module defines the error hierarchy using thiserror. Signal handlers
//! never surface these to the platform; they are logged and the signal is
//! dropped. Caller-facing operations (start tracking, accept, edit) return them.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for geoshift-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Location provider errors (permissions, fixes)
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    /// Key-value store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors (policy rejections)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Shift persistence service errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tracking is not active
    #[error("Tracking is not active")]
    NotTracking,
}

/// Errors reported by a location provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// Foreground or background location permission was denied
    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    /// No fix could be obtained within the allowed staleness
    #[error("No position available: {0}")]
    Unavailable(String),

    /// Registering or removing platform listeners failed
    #[error("Monitoring failed: {0}")]
    Monitoring(String),
}

/// Key-value store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Read or write failed
    #[error("Store operation failed: {0}")]
    Backend(String),

    /// A guarded batch found a different value than expected
    #[error("Concurrent modification of '{key}'")]
    Conflict { key: String },

    /// Store is locked by another writer
    #[error("Store is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end_time ({end}) must be greater than start_time ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Shift shorter than the minimum duration
    #[error("Shift too short: {minutes} minutes (minimum {min_minutes})")]
    TooShort { minutes: i64, min_minutes: i64 },

    /// Out of bounds
    #[error("Index {index} out of bounds for {collection} (length: {len})")]
    OutOfBounds {
        collection: String,
        index: usize,
        len: usize,
    },

    /// The pending queue changed since the draft was taken
    #[error("Pending shift {id} is no longer at index {index}")]
    StaleIndex { id: uuid::Uuid, index: usize },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors returned by the shift persistence service.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The service rejected or failed to store the shift
    #[error("Failed to store shift: {0}")]
    Rejected(String),

    /// The service could not be reached
    #[error("Persistence service unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::Backend(err.to_string())
                }
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
