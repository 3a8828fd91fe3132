//! Output ranking
//!
//! Turns a raw model output vector into the top-k labelled predictions.

use serde::Serialize;

use super::labels;
use super::PredictError;

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionEntry {
    /// Display character of the class
    pub label: String,
    /// Probability as a fraction (0.0 - 1.0)
    pub prob: f32,
}

/// Best class plus the ordered top-k list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub top1: PredictionEntry,
    pub top3: Vec<PredictionEntry>,
}

/// Whether `scores` already sums to 1.0 within `tolerance`
pub fn is_probability_distribution(scores: &[f32], tolerance: f32) -> bool {
    let sum: f32 = scores.iter().sum();
    (sum - 1.0).abs() <= tolerance
}

/// Numerically stable softmax
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Indices and probabilities of the `k` best classes, best first.
///
/// Scores that already look like a distribution are used as-is, anything else
/// goes through softmax. Equal probabilities keep ascending index order.
pub fn rank(scores: &[f32], k: usize, tolerance: f32) -> Vec<(usize, f32)> {
    let probs = if is_probability_distribution(scores, tolerance) {
        scores.to_vec()
    } else {
        softmax(scores)
    };

    let mut ranked: Vec<(usize, f32)> = probs.into_iter().enumerate().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

/// Rank `scores` and attach display labels
pub fn top_k(scores: &[f32], k: usize, tolerance: f32) -> Result<PredictionResult, PredictError> {
    if scores.len() > labels::NUM_CLASSES {
        return Err(PredictError::Inference(format!(
            "model produced {} scores but only {} classes are known",
            scores.len(),
            labels::NUM_CLASSES
        )));
    }

    if scores.iter().any(|s| !s.is_finite()) {
        return Err(PredictError::Inference(
            "model produced non-finite scores".to_string(),
        ));
    }

    let ranked = rank(scores, k, tolerance);
    if ranked.iter().any(|(_, p)| !p.is_finite()) {
        return Err(PredictError::Inference(
            "model produced non-finite scores".to_string(),
        ));
    }

    let top3 = ranked
        .into_iter()
        .map(|(index, prob)| PredictionEntry {
            label: labels::label_for_index(index).unwrap_or_default(),
            prob,
        })
        .collect::<Vec<_>>();

    let top1 = top3
        .first()
        .cloned()
        .ok_or_else(|| PredictError::Inference("model produced no scores".to_string()))?;

    Ok(PredictionResult { top1, top3 })
}
