//! TOML-based application configuration.
//!
//! Stores:
//! - Detector tuning (dwell window, exit buffer, fix freshness)
//! - Shift policy (minimum duration, rounding, local offset)
//! - The user id handed to the shift persistence service
//!
//! Configuration is stored at `~/.config/geoshift/config.toml`.

use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::rounding::RoundingPolicy;
use crate::shift::ShiftFinalizer;
use crate::tracking::TrackerSettings;

/// Detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_dwell_minutes")]
    pub dwell_minutes: u32,
    #[serde(default = "default_exit_buffer_factor")]
    pub exit_buffer_factor: f64,
    #[serde(default = "default_fresh_position_max_age_secs")]
    pub fresh_position_max_age_secs: u64,
    /// Samples less accurate than this are ignored. `0` disables the filter.
    #[serde(default = "default_max_sample_accuracy_meters")]
    pub max_sample_accuracy_meters: f64,
}

/// Shift policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftsConfig {
    #[serde(default = "default_min_shift_minutes")]
    pub min_shift_minutes: i64,
    #[serde(default)]
    pub rounding: RoundingPolicy,
    /// Local offset used for rounding and shift dates. Unset means the
    /// system's current offset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/geoshift/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub shifts: ShiftsConfig,
    #[serde(default)]
    pub user: UserConfig,
}

fn default_dwell_minutes() -> u32 {
    15
}
fn default_exit_buffer_factor() -> f64 {
    1.2
}
fn default_fresh_position_max_age_secs() -> u64 {
    30
}
fn default_max_sample_accuracy_meters() -> f64 {
    100.0
}
fn default_min_shift_minutes() -> i64 {
    15
}
fn default_user_id() -> String {
    "local".into()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            dwell_minutes: default_dwell_minutes(),
            exit_buffer_factor: default_exit_buffer_factor(),
            fresh_position_max_age_secs: default_fresh_position_max_age_secs(),
            max_sample_accuracy_meters: default_max_sample_accuracy_meters(),
        }
    }
}

impl Default for ShiftsConfig {
    fn default() -> Self {
        Self {
            min_shift_minutes: default_min_shift_minutes(),
            rounding: RoundingPolicy::default(),
            utc_offset_minutes: None,
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    // Optional numbers are stored as null until first set.
                    serde_json::Value::Null => match value.parse::<i64>() {
                        Ok(n) => serde_json::Value::Number(n.into()),
                        Err(_) if value == "none" || value.is_empty() => serde_json::Value::Null,
                        Err(e) => return Err(invalid(e.to_string())),
                    },
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or write and return the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and save. Returns error if key is unknown or
    /// the result fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        if self.tracking.exit_buffer_factor < 1.0 {
            return invalid("tracking.exit_buffer_factor", "must be at least 1.0");
        }
        if self.tracking.max_sample_accuracy_meters < 0.0 {
            return invalid("tracking.max_sample_accuracy_meters", "must not be negative");
        }
        if self.shifts.min_shift_minutes < 0 {
            return invalid("shifts.min_shift_minutes", "must not be negative");
        }
        if self.offset().is_none() {
            return invalid("shifts.utc_offset_minutes", "must be within +/-24h");
        }
        Ok(())
    }

    fn offset(&self) -> Option<FixedOffset> {
        match self.shifts.utc_offset_minutes {
            Some(minutes) => FixedOffset::east_opt(minutes.checked_mul(60)?),
            None => Some(Local::now().offset().fix()),
        }
    }

    /// Local offset for rounding and dates.
    pub fn utc_offset(&self) -> FixedOffset {
        self.offset().unwrap_or_else(|| Local::now().offset().fix())
    }

    pub fn finalizer(&self) -> ShiftFinalizer {
        ShiftFinalizer::new(
            self.shifts.rounding,
            self.shifts.min_shift_minutes,
            self.utc_offset(),
        )
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        let accuracy = self.tracking.max_sample_accuracy_meters;
        TrackerSettings {
            dwell: chrono::Duration::minutes(i64::from(self.tracking.dwell_minutes)),
            exit_buffer_factor: self.tracking.exit_buffer_factor,
            fresh_position_max_age: Duration::from_secs(self.tracking.fresh_position_max_age_secs),
            max_sample_accuracy_meters: (accuracy > 0.0).then_some(accuracy),
            finalizer: self.finalizer(),
        }
    }
}
