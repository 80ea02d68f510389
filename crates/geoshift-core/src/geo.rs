//! Coordinates, work sites and great-circle distance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const MIN_RADIUS_M: f64 = 50.0;
pub const MAX_RADIUS_M: f64 = 500.0;

/// Great-circle distance in meters between two WGS84 coordinates.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards asin against a > 1.0 from float error on antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// A circular geofence around the user's workplace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkSite {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl WorkSite {
    /// Build a validated work site.
    pub fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Result<Self, ValidationError> {
        let site = Self {
            latitude,
            longitude,
            radius_meters,
        };
        site.validate()?;
        Ok(site)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::InvalidValue {
                field: "latitude".into(),
                message: format!("{} is outside [-90, 90]", self.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::InvalidValue {
                field: "longitude".into(),
                message: format!("{} is outside [-180, 180]", self.longitude),
            });
        }
        if !(MIN_RADIUS_M..=MAX_RADIUS_M).contains(&self.radius_meters) {
            return Err(ValidationError::InvalidValue {
                field: "radius_meters".into(),
                message: format!(
                    "{} is outside [{MIN_RADIUS_M}, {MAX_RADIUS_M}]",
                    self.radius_meters
                ),
            });
        }
        Ok(())
    }

    pub fn distance_to(&self, position: &Position) -> f64 {
        distance_meters(
            self.latitude,
            self.longitude,
            position.latitude,
            position.longitude,
        )
    }

    /// True when `position` lies within `radius_meters * factor`.
    pub fn contains(&self, position: &Position, factor: f64) -> bool {
        self.distance_to(position) <= self.radius_meters * factor
    }
}

/// A single position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    /// Horizontal accuracy radius in meters, when the platform reports one.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}
