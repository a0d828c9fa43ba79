//! Row types for the detection database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One classification event above threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// Opaque identity.
    pub id: Uuid,
    /// Raw model label.
    pub species_tensor: String,
    /// Scientific (latin) name.
    pub scientific_name: String,
    /// Common name as reported by the model.
    pub common_name: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    /// Detection instant, UTC.
    pub timestamp: DateTime<Utc>,
    /// Linked audio clip, when one was persisted.
    pub audio_file_id: Option<Uuid>,
    /// Station latitude at detection time.
    pub latitude: Option<f64>,
    /// Station longitude at detection time.
    pub longitude: Option<f64>,
    /// Admit cutoff in force when the detection was accepted.
    pub species_confidence_threshold: f64,
    /// ISO week number (1-53).
    pub week: i64,
    /// Classifier sensitivity setting.
    pub sensitivity_setting: f64,
    /// Segment overlap in seconds.
    pub overlap: f64,
    /// `floor(unix_seconds / 3600)`, for weather joins.
    pub hour_epoch: Option<i64>,
}

/// A persisted clip backing a detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFile {
    /// Opaque identity.
    pub id: Uuid,
    /// Path relative to the recordings root; unique.
    pub file_path: String,
    /// Clip duration in seconds.
    pub duration: f64,
    /// File size in bytes.
    pub size_bytes: i64,
    /// Recording start instant, UTC.
    pub recording_start: DateTime<Utc>,
}

/// Hourly weather observation, keyed by hour epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weather {
    /// `floor(unix_seconds / 3600)`.
    pub hour_epoch: i64,
    /// Temperature in degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// Air pressure in hPa.
    pub pressure: Option<f64>,
    /// Wind speed in m/s.
    pub wind_speed: Option<f64>,
    /// Precipitation in mm.
    pub precipitation: Option<f64>,
}

/// Per-species count over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeciesCount {
    /// Scientific name.
    pub scientific_name: String,
    /// Common name.
    pub common_name: String,
    /// Detection count.
    pub count: i64,
}

/// Detection count for one hour of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyCount {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Detection count in that hour.
    pub count: i64,
}

/// Aggregate clip storage metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageMetrics {
    /// Total clip bytes on disk.
    pub total_bytes: i64,
    /// Total clip duration in seconds.
    pub total_duration: f64,
}

/// Top species row with counts for the current and prior periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopSpeciesRow {
    /// Scientific name.
    pub scientific_name: String,
    /// Common name (falls back to scientific name).
    pub common_name: String,
    /// Count in the current period.
    pub current_count: i64,
    /// Count in the prior period.
    pub prior_count: i64,
}
