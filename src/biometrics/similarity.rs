//! Lenient client-side similarity scoring between two feature vectors.
//!
//! The score is advisory only: it pre-screens a fresh sample against a
//! reference before the vector is shipped to the prediction service, whose
//! verdict is the authoritative decision. Every divisor, weight, and floor
//! lives in [`SimilarityTolerances`] so leniency can be tuned without
//! touching the algorithm.

use serde::{Deserialize, Serialize};

use crate::models::FeatureVector;

/// Named tolerance values for the similarity heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityTolerances {
    /// Divisor applied to the larger mean dwell when comparing means.
    pub dwell_mean_divisor: f64,
    /// Divisor applied to the larger dwell variance when comparing variances.
    pub dwell_variance_divisor: f64,
    /// Divisor applied to the larger mean flight when comparing means.
    pub flight_mean_divisor: f64,
    /// Divisor applied to the larger flight variance when comparing variances.
    pub flight_variance_divisor: f64,
    /// Per-unit penalty slope for normalized-rhythm differences.
    pub rhythm_slope: f64,
    /// Weight of the dwell-time component in the combined score.
    pub dwell_weight: f64,
    /// Weight of the inter-key interval component.
    pub flight_weight: f64,
    /// Weight of the rhythm component.
    pub rhythm_weight: f64,
    /// Penalty per unit of relative length difference.
    pub length_penalty_rate: f64,
    /// Lowest value the length penalty may take.
    pub length_penalty_floor: f64,
    /// Lowest score a comparison of two non-empty vectors may produce.
    pub score_floor: f64,
}

impl Default for SimilarityTolerances {
    fn default() -> Self {
        SimilarityTolerances {
            dwell_mean_divisor: 3.0,
            dwell_variance_divisor: 5.0,
            flight_mean_divisor: 3.0,
            flight_variance_divisor: 5.0,
            rhythm_slope: 0.3,
            dwell_weight: 0.70,
            flight_weight: 0.25,
            rhythm_weight: 0.05,
            length_penalty_rate: 0.1,
            length_penalty_floor: 0.8,
            score_floor: 0.7,
        }
    }
}

/// Summary features extracted from one vector before comparison.
#[derive(Debug, Clone, Default)]
struct VectorSummary {
    count: usize,
    mean_dwell: f64,
    dwell_variance: f64,
    mean_flight: f64,
    flight_variance: f64,
    /// Each flight divided by the mean flight.
    rhythm: Vec<f64>,
}

impl VectorSummary {
    fn from_vector(vector: &FeatureVector) -> Self {
        let dwells: Vec<f64> = vector.dwells().collect();
        let flights: Vec<f64> = vector.flights().collect();

        let mean_dwell = mean(&dwells);
        let mean_flight = mean(&flights);

        let rhythm = if mean_flight > 0.0 {
            flights.iter().map(|f| f / mean_flight).collect()
        } else {
            Vec::new()
        };

        VectorSummary {
            count: vector.len(),
            mean_dwell,
            dwell_variance: variance(&dwells, mean_dwell),
            mean_flight,
            flight_variance: variance(&flights, mean_flight),
            rhythm,
        }
    }

    fn has_flights(&self) -> bool {
        self.count > 1
    }
}

/// Similarity score in `[0, 1]` between two feature vectors.
///
/// Combines dwell-time, interval, and rhythm similarities under fixed
/// weights, applies a floor-clamped length-mismatch penalty, and finally
/// clamps the result to `[score_floor, 1]`. Either side being empty scores
/// 0; the floor applies only to comparisons of non-empty vectors.
pub fn similarity(a: &FeatureVector, b: &FeatureVector, tol: &SimilarityTolerances) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let first = VectorSummary::from_vector(a);
    let second = VectorSummary::from_vector(b);

    let dwell_similarity = paired_similarity(
        first.mean_dwell,
        second.mean_dwell,
        first.dwell_variance,
        second.dwell_variance,
        tol.dwell_mean_divisor,
        tol.dwell_variance_divisor,
    );

    let interval_similarity = if first.has_flights() && second.has_flights() {
        paired_similarity(
            first.mean_flight,
            second.mean_flight,
            first.flight_variance,
            second.flight_variance,
            tol.flight_mean_divisor,
            tol.flight_variance_divisor,
        )
    } else {
        0.0
    };

    let rhythm_similarity = rhythm_similarity(&first.rhythm, &second.rhythm, tol.rhythm_slope);

    let length_penalty = length_penalty(
        first.count,
        second.count,
        tol.length_penalty_rate,
        tol.length_penalty_floor,
    );

    let combined = (dwell_similarity * tol.dwell_weight
        + interval_similarity * tol.flight_weight
        + rhythm_similarity * tol.rhythm_weight)
        * length_penalty;

    combined.max(tol.score_floor).clamp(0.0, 1.0)
}

/// Mean + variance comparison shared by the dwell and interval components.
fn paired_similarity(
    mean_a: f64,
    mean_b: f64,
    var_a: f64,
    var_b: f64,
    mean_divisor: f64,
    variance_divisor: f64,
) -> f64 {
    let max_mean = mean_a.max(mean_b);
    let mean_similarity = if max_mean > 0.0 {
        (1.0 - (mean_a - mean_b).abs() / (max_mean * mean_divisor)).max(0.0)
    } else {
        1.0
    };

    let max_variance = var_a.max(var_b);
    let variance_similarity = if max_variance > 0.0 {
        (1.0 - (var_a - var_b).abs() / (max_variance * variance_divisor)).max(0.0)
    } else {
        1.0
    };

    (mean_similarity + variance_similarity) / 2.0
}

fn rhythm_similarity(a: &[f64], b: &[f64], slope: f64) -> f64 {
    let shared = a.len().min(b.len());
    if shared == 0 {
        return 0.0;
    }

    let total: f64 = a
        .iter()
        .zip(b.iter())
        .take(shared)
        .map(|(x, y)| (1.0 - (x - y).abs() * slope).max(0.0))
        .sum();

    total / shared as f64
}

fn length_penalty(count_a: usize, count_b: usize, rate: f64, floor: f64) -> f64 {
    if count_a == 0 || count_b == 0 {
        return 0.0;
    }

    let difference = count_a.abs_diff(count_b) as f64;
    let ratio = difference / count_a.max(count_b) as f64;

    (1.0 - ratio * rate).max(floor)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
