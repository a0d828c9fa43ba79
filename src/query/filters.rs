//! Query filter types.

use crate::constants::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use chrono::{DateTime, Utc};

/// Sortable columns for detection queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    /// Detection instant.
    #[default]
    Timestamp,
    /// Classifier confidence.
    Confidence,
    /// Scientific name.
    ScientificName,
    /// Taxonomic family (falls back to scientific name without taxonomy).
    Family,
}

/// Filters for the main detection query. All filters are optional and
/// combined with AND.
#[derive(Debug, Clone)]
pub struct DetectionQuery {
    /// Scientific names; empty means no species filter.
    pub species: Vec<String>,
    /// Taxonomic family filter.
    pub family: Option<String>,
    /// Taxonomic genus filter.
    pub genus: Option<String>,
    /// Inclusive lower bound on timestamp.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on timestamp.
    pub end_date: Option<DateTime<Utc>>,
    /// Minimum confidence.
    pub min_confidence: Option<f64>,
    /// Maximum confidence.
    pub max_confidence: Option<f64>,
    /// Maximum rows returned; `None` means no limit.
    pub limit: Option<i64>,
    /// Rows skipped before the first returned.
    pub offset: i64,
    /// Sort column.
    pub order_by: OrderBy,
    /// Sort direction.
    pub order_desc: bool,
    /// Compute first-ever / first-in-period flags (adds window functions).
    pub include_first_detections: bool,
}

impl Default for DetectionQuery {
    fn default() -> Self {
        Self {
            species: Vec::new(),
            family: None,
            genus: None,
            start_date: None,
            end_date: None,
            min_confidence: None,
            max_confidence: None,
            limit: None,
            offset: 0,
            order_by: OrderBy::Timestamp,
            order_desc: true,
            include_first_detections: false,
        }
    }
}

/// Parameters for the best-recordings-per-species query.
#[derive(Debug, Clone)]
pub struct BestRecordingsQuery {
    /// Keep at most this many recordings per species; `None` means all.
    /// Ignored when a specific species is requested.
    pub per_species_limit: Option<i64>,
    /// Minimum confidence.
    pub min_confidence: f64,
    /// Page number, 1-indexed.
    pub page: u32,
    /// Rows per page; clamped to `[1, 500]`.
    pub per_page: u32,
    /// Taxonomic family filter.
    pub family: Option<String>,
    /// Genus filter (matched as a scientific-name prefix).
    pub genus: Option<String>,
    /// Specific species filter.
    pub species: Option<String>,
}

impl Default for BestRecordingsQuery {
    fn default() -> Self {
        Self {
            per_species_limit: Some(5),
            min_confidence: 0.5,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            family: None,
            genus: None,
            species: None,
        }
    }
}

impl BestRecordingsQuery {
    /// Clamped per-page value.
    pub fn per_page_clamped(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Row offset implied by the page number.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.per_page_clamped())
    }
}

/// Temporal grouping for period aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalResolution {
    /// One bucket per hour.
    Hourly,
    /// One bucket per calendar day.
    Daily,
    /// One bucket per week (Monday start).
    Weekly,
}
