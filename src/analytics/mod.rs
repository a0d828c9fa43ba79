//! Ecological analytics over the query layer's aggregates.
//!
//! The index math lives in pure functions (no SQL, no state); the
//! [`AnalyticsEngine`] fetches the aggregates from the store and query
//! engine and delegates to them.

mod accumulation;
mod correlation;
mod dashboard;
mod diversity;
mod similarity;

pub use accumulation::{AccumulationCurve, AccumulationMethod, species_accumulation};
pub use correlation::{WeatherCorrelations, pearson, weather_correlations};
pub use dashboard::{
    ActivityPeriods, DashboardSummary, DetectionTrends, FrequencyCategory, SpeciesFrequency,
    TemporalPatterns, categorize_frequency, percent_change, species_frequency, temporal_patterns,
};
pub use diversity::{DiversityMetrics, diversity_timeline};
pub use similarity::{
    SimilarityIndex, SimilarityMatrix, TurnoverPoint, beta_diversity, similarity,
    similarity_matrix,
};

use crate::db::DetectionStore;
use crate::error::Result;
use crate::query::{QueryEngine, TemporalResolution};
use crate::utils::time::local_day_start;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Computes ecological analytics from query-layer aggregates.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    store: DetectionStore,
    query: QueryEngine,
    timezone: Tz,
    confidence_threshold: f64,
}

impl AnalyticsEngine {
    /// Build the engine.
    pub fn new(
        store: DetectionStore,
        query: QueryEngine,
        timezone: Tz,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            store,
            query,
            timezone,
            confidence_threshold,
        }
    }

    /// Diversity metrics per time bucket.
    pub async fn diversity_timeline(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: TemporalResolution,
    ) -> Result<Vec<DiversityMetrics>> {
        let periods = self
            .query
            .species_counts_by_period(start, end, resolution)
            .await?;
        Ok(diversity_timeline(&periods))
    }

    /// Species accumulation curve over the range.
    pub async fn species_accumulation(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        method: AccumulationMethod,
    ) -> Result<AccumulationCurve> {
        let detections = self.query.detections_for_accumulation(start, end).await?;
        Ok(species_accumulation(&detections, method))
    }

    /// Pairwise community similarity between the given periods.
    pub async fn community_similarity(
        &self,
        periods: &[(DateTime<Utc>, DateTime<Utc>)],
        index: SimilarityIndex,
    ) -> Result<SimilarityMatrix> {
        let communities = self.query.species_counts_for_periods(periods).await?;
        Ok(similarity_matrix(&communities, index))
    }

    /// Temporal turnover over sliding windows of `window_size`.
    pub async fn beta_diversity(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window_size: Duration,
    ) -> Result<Vec<TurnoverPoint>> {
        let windows = self
            .query
            .species_sets_by_window(start, end, window_size)
            .await?;
        Ok(beta_diversity(&windows))
    }

    /// Pearson correlations between hourly detection counts and weather.
    pub async fn weather_correlations(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WeatherCorrelations> {
        let series = self.query.weather_correlation_series(start, end).await?;
        Ok(weather_correlations(&series))
    }

    /// Dashboard summary tiles.
    #[allow(clippy::cast_precision_loss)]
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let now = Utc::now();
        let today_start = local_day_start(now, self.timezone);
        let week_ago = now - Duration::days(7);

        let detections_today = self.store.detection_count(today_start, now).await?;
        let species_total = self
            .store
            .unique_species_count(DateTime::UNIX_EPOCH, now)
            .await?;
        let species_week = self.store.unique_species_count(week_ago, now).await?;
        let storage = self.store.storage_metrics().await?;

        Ok(DashboardSummary {
            species_total,
            detections_today,
            species_week,
            storage_gb: storage.total_bytes as f64 / f64::from(1 << 30),
            hours_monitored: storage.total_duration / 3600.0,
            confidence_threshold: self.confidence_threshold,
        })
    }

    /// Temporal activity pattern for a date (defaults to the local today).
    pub async fn temporal_patterns(&self, date: Option<NaiveDate>) -> Result<TemporalPatterns> {
        let date =
            date.unwrap_or_else(|| Utc::now().with_timezone(&self.timezone).date_naive());
        let hourly = self.store.hourly_counts(date).await?;
        Ok(temporal_patterns(&hourly))
    }

    /// Species frequency distribution over the trailing window.
    pub async fn species_frequency(&self, hours: i64) -> Result<Vec<SpeciesFrequency>> {
        let end = Utc::now();
        let start = end - Duration::hours(hours);
        let counts = self.store.species_counts(start, end).await?;
        Ok(species_frequency(&counts))
    }

    /// Peak activity hour and count for a date; noon when the day is empty.
    pub async fn peak_activity(&self, date: NaiveDate) -> Result<(u32, i64)> {
        let hourly = self.store.hourly_counts(date).await?;

        // First hour reaching the maximum count wins ties.
        let mut peak_hour = 12;
        let mut peak_count = 0;
        for entry in &hourly {
            if entry.count > peak_count {
                peak_count = entry.count;
                peak_hour = entry.hour;
            }
        }
        Ok((peak_hour, peak_count))
    }

    /// Detection and species trends versus the preceding period of equal
    /// length.
    pub async fn detection_trends(&self, days: i64) -> Result<DetectionTrends> {
        let now = Utc::now();
        let current_start = now - Duration::days(days);
        let prior_start = now - Duration::days(days * 2);

        let current_detections = self.store.detection_count(current_start, now).await?;
        let prior_detections = self
            .store
            .detection_count(prior_start, current_start)
            .await?;
        let current_species = self.store.unique_species_count(current_start, now).await?;
        let prior_species = self
            .store
            .unique_species_count(prior_start, current_start)
            .await?;

        Ok(DetectionTrends {
            detection_trend: percent_change(current_detections, prior_detections),
            species_trend: percent_change(current_species, prior_species),
        })
    }
}
