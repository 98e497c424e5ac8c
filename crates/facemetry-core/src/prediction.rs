//! Ranking and formatting of an external image classifier's output.
//!
//! The probabilities themselves come from outside; this module only pairs them
//! with class labels, sorts them and renders them for display.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("{labels} labels but {probabilities} probabilities")]
    LengthMismatch { labels: usize, probabilities: usize },
    #[error("probability for {label:?} is not finite")]
    NonFinite { label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// In [0, 1].
    pub probability: f32,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.1}%", self.label, self.probability * 100.0)
    }
}

/// Pair labels with probabilities and sort by descending probability.
/// Ties keep the classifier's label order.
pub fn rank_predictions<S: AsRef<str>>(
    labels: &[S],
    probabilities: &[f32],
) -> Result<Vec<Prediction>, PredictionError> {
    if labels.len() != probabilities.len() {
        return Err(PredictionError::LengthMismatch {
            labels: labels.len(),
            probabilities: probabilities.len(),
        });
    }

    let mut ranked = labels
        .iter()
        .zip(probabilities)
        .map(|(label, &probability)| {
            if probability.is_finite() {
                Ok(Prediction {
                    label: label.as_ref().to_string(),
                    probability,
                })
            } else {
                Err(PredictionError::NonFinite {
                    label: label.as_ref().to_string(),
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    Ok(ranked)
}

/// One prediction per line, at most `limit` lines.
pub fn format_predictions(predictions: &[Prediction], limit: usize) -> String {
    predictions
        .iter()
        .take(limit)
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
