//! Enriched query result types.

use crate::db::Detection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A detection joined with taxonomy and translation columns from the
/// attached reference databases. Assembled per query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedDetection {
    /// The persisted detection row.
    #[serde(flatten)]
    pub detection: Detection,
    /// IOC english name (falls back to the detection's common name).
    pub ioc_english_name: Option<String>,
    /// Best common name for the configured language.
    pub translated_name: Option<String>,
    /// Taxonomic family.
    pub family: Option<String>,
    /// Taxonomic genus.
    pub genus: Option<String>,
    /// Taxonomic order.
    pub order_name: Option<String>,
    /// Whether this is the chronologically first detection of the species
    /// across all time. Only set when first-detection flags were requested.
    pub is_first_ever: Option<bool>,
    /// Whether this is the first detection of the species inside the
    /// query's time filter. Only set when first-detection flags were
    /// requested.
    pub is_first_in_period: Option<bool>,
    /// Timestamp of the species' first-ever detection.
    pub first_ever_detection: Option<DateTime<Utc>>,
    /// Timestamp of the species' first detection in the period.
    pub first_period_detection: Option<DateTime<Utc>>,
}

/// Per-species aggregate row for the species summary query.
#[derive(Debug, Clone, Serialize)]
pub struct SpeciesSummaryRow {
    /// Scientific name.
    pub scientific_name: String,
    /// Detection count.
    pub detection_count: i64,
    /// Average confidence, rounded to 3 decimals.
    pub avg_confidence: f64,
    /// Most recent detection instant.
    pub latest_detection: Option<DateTime<Utc>>,
    /// IOC english name.
    pub ioc_english_name: Option<String>,
    /// Best common name for the configured language.
    pub translated_name: Option<String>,
    /// Taxonomic family.
    pub family: Option<String>,
    /// Taxonomic genus.
    pub genus: Option<String>,
    /// Taxonomic order.
    pub order_name: Option<String>,
    /// Translated name, falling back to the IOC english name.
    pub best_common_name: Option<String>,
    /// All-time first detection; only with first-detection flags.
    pub first_ever_detection: Option<DateTime<Utc>>,
    /// First detection within `since`; only with first-detection flags.
    pub first_period_detection: Option<DateTime<Utc>>,
}

/// Per-family aggregate row.
#[derive(Debug, Clone, Serialize)]
pub struct FamilySummaryRow {
    /// Taxonomic family.
    pub family: Option<String>,
    /// Taxonomic order.
    pub order_name: Option<String>,
    /// Detection count.
    pub detection_count: i64,
    /// Unique species count.
    pub species_count: i64,
    /// Average confidence, rounded to 3 decimals.
    pub avg_confidence: f64,
    /// Most recent detection instant.
    pub latest_detection: Option<DateTime<Utc>>,
}

/// Species counts for one time bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSpeciesCounts {
    /// Bucket label, e.g. `2025-05-01` or `2025-05-01 06:00:00`.
    pub period: String,
    /// Detection count per scientific name.
    pub counts: HashMap<String, i64>,
}

/// Distinct species observed in one sliding window.
#[derive(Debug, Clone)]
pub struct WindowSpecies {
    /// Window start (inclusive).
    pub period_start: DateTime<Utc>,
    /// Window end (exclusive).
    pub period_end: DateTime<Utc>,
    /// Species observed inside the window.
    pub species: HashSet<String>,
}

/// First-detection flags for one detection, used by notification scopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeFlags {
    /// First detection of the species across all time.
    pub first_ever: bool,
    /// First detection of the species since the local day started.
    pub first_today: bool,
    /// First detection of the species since the local week started.
    pub first_this_week: bool,
}

/// Hour-bucketed detection counts joined with weather observations.
///
/// Vectors are parallel; weather values are `None` for hours without an
/// observation.
#[derive(Debug, Clone, Default)]
pub struct WeatherSeries {
    /// Hour epochs.
    pub hours: Vec<i64>,
    /// Detections per hour.
    pub detection_counts: Vec<i64>,
    /// Unique species per hour.
    pub species_counts: Vec<i64>,
    /// Temperature per hour.
    pub temperature: Vec<Option<f64>>,
    /// Humidity per hour.
    pub humidity: Vec<Option<f64>>,
    /// Pressure per hour.
    pub pressure: Vec<Option<f64>>,
    /// Wind speed per hour.
    pub wind_speed: Vec<Option<f64>>,
    /// Precipitation per hour.
    pub precipitation: Vec<Option<f64>>,
}
