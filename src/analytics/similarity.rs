//! Community similarity and temporal turnover.

use crate::query::WindowSpecies;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Similarity index between two species-count communities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityIndex {
    /// `|A ∩ B| / |A ∪ B|` on species sets.
    Jaccard,
    /// `2|A ∩ B| / (|A| + |B|)` on species sets.
    Sorensen,
    /// `2 Σ min(a_s, b_s) / (Σa + Σb)` on abundances.
    BrayCurtis,
}

/// Pairwise similarity between communities.
#[allow(clippy::cast_precision_loss)]
pub fn similarity(
    a: &HashMap<String, i64>,
    b: &HashMap<String, i64>,
    index: SimilarityIndex,
) -> f64 {
    let species_a: HashSet<&str> = a.keys().map(String::as_str).collect();
    let species_b: HashSet<&str> = b.keys().map(String::as_str).collect();

    match index {
        SimilarityIndex::Jaccard => {
            let intersection = species_a.intersection(&species_b).count();
            let union = species_a.union(&species_b).count();
            if union > 0 {
                intersection as f64 / union as f64
            } else {
                0.0
            }
        }
        SimilarityIndex::Sorensen => {
            let intersection = species_a.intersection(&species_b).count();
            let total = species_a.len() + species_b.len();
            if total > 0 {
                2.0 * intersection as f64 / total as f64
            } else {
                0.0
            }
        }
        SimilarityIndex::BrayCurtis => {
            let min_sum: i64 = species_a
                .union(&species_b)
                .map(|species| {
                    a.get(*species)
                        .copied()
                        .unwrap_or(0)
                        .min(b.get(*species).copied().unwrap_or(0))
                })
                .sum();
            let total_sum: i64 = a.values().sum::<i64>() + b.values().sum::<i64>();
            if total_sum > 0 {
                2.0 * min_sum as f64 / total_sum as f64
            } else {
                0.0
            }
        }
    }
}

/// Symmetric similarity matrix over period communities.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityMatrix {
    /// Period labels, `Period 1..n`.
    pub labels: Vec<String>,
    /// Symmetric matrix with unit diagonal.
    pub matrix: Vec<Vec<f64>>,
    /// Index used.
    pub index: SimilarityIndex,
}

/// Compute the full pairwise similarity matrix.
pub fn similarity_matrix(
    communities: &[HashMap<String, i64>],
    index: SimilarityIndex,
) -> SimilarityMatrix {
    let n = communities.len();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let value = similarity(&communities[i], &communities[j], index);
            matrix[i][j] = value;
            matrix[j][i] = value;
        }
    }

    SimilarityMatrix {
        labels: (1..=n).map(|i| format!("Period {i}")).collect(),
        matrix,
        index,
    }
}

/// Turnover between two consecutive sliding windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnoverPoint {
    /// Start of the earlier window.
    pub period_start: String,
    /// End of the earlier window.
    pub period_end: String,
    /// `(gained + lost) / (2 |union|)`, rounded to 4 decimals.
    pub turnover_rate: f64,
    /// Species present in the later window only.
    pub species_gained: usize,
    /// Species present in the earlier window only.
    pub species_lost: usize,
    /// Species count of the earlier window.
    pub total_species: usize,
}

/// Temporal beta diversity over consecutive sliding windows.
#[allow(clippy::cast_precision_loss)]
pub fn beta_diversity(windows: &[WindowSpecies]) -> Vec<TurnoverPoint> {
    windows
        .windows(2)
        .map(|pair| {
            let current = &pair[0];
            let next = &pair[1];

            let gained = next.species.difference(&current.species).count();
            let lost = current.species.difference(&next.species).count();
            let union = current.species.union(&next.species).count();

            let turnover_rate = if union > 0 {
                (gained + lost) as f64 / (2.0 * union as f64)
            } else {
                0.0
            };

            TurnoverPoint {
                period_start: current.period_start.to_rfc3339(),
                period_end: current.period_end.to_rfc3339(),
                turnover_rate: (turnover_rate * 10_000.0).round() / 10_000.0,
                species_gained: gained,
                species_lost: lost,
                total_species: current.species.len(),
            }
        })
        .collect()
}
