//! Diversity indices per time bucket.

use crate::query::PeriodSpeciesCounts;
use serde::Serialize;

/// Diversity metrics for one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiversityMetrics {
    /// Bucket label.
    pub period: String,
    /// Species richness `S`.
    pub richness: usize,
    /// Shannon index `H' = -Σ p_i ln p_i`, rounded to 4 decimals.
    pub shannon: f64,
    /// Simpson index `D = 1 - Σ p_i²`, rounded to 4 decimals.
    pub simpson: f64,
    /// Pielou evenness `J = H' / ln S`; 1.0 for a single species,
    /// 0.0 for an empty bucket. Rounded to 4 decimals.
    pub evenness: f64,
    /// Total detections in the bucket.
    pub total_detections: i64,
}

/// Compute the diversity timeline over period aggregates.
#[allow(clippy::cast_precision_loss)]
pub fn diversity_timeline(periods: &[PeriodSpeciesCounts]) -> Vec<DiversityMetrics> {
    periods
        .iter()
        .map(|period| {
            let total: i64 = period.counts.values().sum();
            let richness = period.counts.len();

            let (shannon, simpson, evenness) = if total > 0 {
                let total_f = total as f64;
                let mut shannon = 0.0;
                let mut simpson_sum = 0.0;
                for &count in period.counts.values() {
                    if count > 0 {
                        let p = count as f64 / total_f;
                        shannon -= p * p.ln();
                        simpson_sum += p * p;
                    }
                }
                let simpson = 1.0 - simpson_sum;
                let evenness = if richness > 1 {
                    shannon / (richness as f64).ln()
                } else {
                    1.0
                };
                (shannon, simpson, evenness)
            } else {
                (0.0, 0.0, 0.0)
            };

            DiversityMetrics {
                period: period.period.clone(),
                richness,
                shannon: round4(shannon),
                simpson: round4(simpson),
                evenness: round4(evenness),
                total_detections: total,
            }
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn period(counts: &[(&str, i64)]) -> PeriodSpeciesCounts {
        PeriodSpeciesCounts {
            period: "2025-05-01".to_string(),
            counts: counts
                .iter()
                .map(|(name, count)| ((*name).to_string(), *count))
                .collect(),
        }
    }

    #[test]
    fn test_known_arithmetic() {
        // Counts {A:4, B:4, C:2}: p = (0.4, 0.4, 0.2).
        let metrics = diversity_timeline(&[period(&[("A", 4), ("B", 4), ("C", 2)])]);
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0];
        assert_eq!(m.richness, 3);
        assert_eq!(m.total_detections, 10);
        assert!((m.shannon - 1.0549).abs() < 1e-4);
        assert!((m.simpson - 0.64).abs() < 1e-4);
        assert!((m.evenness - 0.9602).abs() < 1e-4);
    }

    #[test]
    fn test_single_species_evenness_is_one() {
        let metrics = diversity_timeline(&[period(&[("A", 7)])]);
        let m = &metrics[0];
        assert_eq!(m.shannon, 0.0);
        assert_eq!(m.simpson, 0.0);
        assert_eq!(m.evenness, 1.0);
    }

    #[test]
    fn test_empty_bucket_is_all_zero() {
        let metrics = diversity_timeline(&[PeriodSpeciesCounts {
            period: "2025-05-01".to_string(),
            counts: HashMap::new(),
        }]);
        let m = &metrics[0];
        assert_eq!(m.richness, 0);
        assert_eq!(m.shannon, 0.0);
        assert_eq!(m.simpson, 0.0);
        assert_eq!(m.evenness, 0.0);
    }

    #[test]
    fn test_bounds() {
        let metrics = diversity_timeline(&[period(&[("A", 1), ("B", 10), ("C", 100)])]);
        let m = &metrics[0];
        assert!(m.shannon >= 0.0);
        assert!((0.0..=1.0).contains(&m.simpson));
        assert!((0.0..=1.0).contains(&m.evenness));
    }

    #[test]
    fn test_even_distribution_maximizes_evenness() {
        let metrics = diversity_timeline(&[period(&[("A", 5), ("B", 5), ("C", 5)])]);
        assert_eq!(metrics[0].evenness, 1.0);
    }
}
