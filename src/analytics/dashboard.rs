//! Dashboard aggregates: summary tiles, temporal activity patterns,
//! frequency categories, and period-over-period trends.

use crate::db::{HourlyCount, SpeciesCount};
use serde::Serialize;

/// Summary statistics for the dashboard header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    /// Unique species across all time.
    pub species_total: i64,
    /// Detections since local midnight.
    pub detections_today: i64,
    /// Unique species in the last seven days.
    pub species_week: i64,
    /// Total clip storage in GiB.
    pub storage_gb: f64,
    /// Total recorded audio in hours.
    pub hours_monitored: f64,
    /// The configured admit cutoff.
    pub confidence_threshold: f64,
}

/// How often a species shows up in the analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyCategory {
    /// More than 20 detections: a frequent visitor.
    Common,
    /// 6-20 detections: an occasional visitor.
    Regular,
    /// 5 or fewer detections: a rare sighting.
    Uncommon,
}

/// Categorize a species by detection count; thresholds are calibrated for
/// 24-hour windows.
pub fn categorize_frequency(count: i64) -> FrequencyCategory {
    if count > 20 {
        FrequencyCategory::Common
    } else if count > 5 {
        FrequencyCategory::Regular
    } else {
        FrequencyCategory::Uncommon
    }
}

/// One species' share of the window's detections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesFrequency {
    /// Display name (common name, falling back to scientific).
    pub name: String,
    /// Scientific name.
    pub scientific_name: String,
    /// Detection count.
    pub count: i64,
    /// Share of the window's detections, in percent.
    pub percentage: f64,
    /// Frequency category.
    pub category: FrequencyCategory,
}

/// Build the frequency distribution from windowed species counts.
#[allow(clippy::cast_precision_loss)]
pub fn species_frequency(counts: &[SpeciesCount]) -> Vec<SpeciesFrequency> {
    let total: i64 = counts.iter().map(|c| c.count).sum();
    counts
        .iter()
        .map(|c| SpeciesFrequency {
            name: if c.common_name.is_empty() {
                c.scientific_name.clone()
            } else {
                c.common_name.clone()
            },
            scientific_name: c.scientific_name.clone(),
            count: c.count,
            percentage: if total > 0 {
                c.count as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            category: categorize_frequency(c.count),
        })
        .collect()
}

/// Detection counts bucketed into the six 4-hour activity periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityPeriods {
    /// 12am-4am.
    pub night_early: i64,
    /// 4am-8am.
    pub dawn: i64,
    /// 8am-12pm.
    pub morning: i64,
    /// 12pm-4pm.
    pub afternoon: i64,
    /// 4pm-8pm.
    pub evening: i64,
    /// 8pm-12am.
    pub night_late: i64,
}

/// Temporal activity pattern for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalPatterns {
    /// Detections per hour of day, 24 slots.
    pub hourly_distribution: Vec<i64>,
    /// Hour with the most detections; 6am when the day is empty
    /// (typical bird activity time).
    pub peak_hour: u32,
    /// 4-hour period buckets.
    pub periods: ActivityPeriods,
}

/// Expand sparse hourly counts into the 24-slot pattern.
pub fn temporal_patterns(hourly: &[HourlyCount]) -> TemporalPatterns {
    let mut distribution = vec![0i64; 24];
    for entry in hourly {
        if let Some(slot) = distribution.get_mut(entry.hour as usize) {
            *slot = entry.count;
        }
    }

    // First hour with the maximum count wins ties.
    let mut peak_hour = 6u32;
    let mut max_count = 0i64;
    for (hour, &count) in distribution.iter().enumerate() {
        if count > max_count {
            max_count = count;
            peak_hour = u32::try_from(hour).unwrap_or(6);
        }
    }

    let sum = |range: std::ops::Range<usize>| distribution[range].iter().sum();
    TemporalPatterns {
        peak_hour,
        periods: ActivityPeriods {
            night_early: sum(0..4),
            dawn: sum(4..8),
            morning: sum(8..12),
            afternoon: sum(12..16),
            evening: sum(16..20),
            night_late: sum(20..24),
        },
        hourly_distribution: distribution,
    }
}

/// Percent change between periods, rounded to 1 decimal; zero when the
/// prior period had nothing to compare against.
#[allow(clippy::cast_precision_loss)]
pub fn percent_change(current: i64, prior: i64) -> f64 {
    if prior <= 0 {
        return 0.0;
    }
    let change = (current - prior) as f64 / prior as f64 * 100.0;
    (change * 10.0).round() / 10.0
}

/// Detection and species trends versus the prior period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionTrends {
    /// Percent change in detections.
    pub detection_trend: f64,
    /// Percent change in unique species.
    pub species_trend: f64,
}
