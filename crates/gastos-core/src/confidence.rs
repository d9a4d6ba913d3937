//! Overall confidence aggregation

use crate::config::ConfidenceWeights;

/// Weighted mean of the four field confidences, rounded to one decimal
///
/// Weights are validated to sum to 1 when configuration loads, so the result
/// stays within 0..=100 and never decreases when a field confidence rises.
pub fn overall_confidence(
    weights: &ConfidenceWeights,
    amount: u8,
    date: u8,
    title: u8,
    category: u8,
) -> f64 {
    let score = weights.amount * f64::from(amount)
        + weights.date * f64::from(date)
        + weights.title * f64::from(title)
        + weights.category * f64::from(category);
    ((score * 10.0).round() / 10.0).clamp(0.0, 100.0)
}
