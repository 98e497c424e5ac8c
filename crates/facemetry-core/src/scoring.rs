//! Deviation scoring and the aggregate match score.

use crate::calibration::Range;
use crate::metrics::Metric;
use serde::{Deserialize, Serialize};

/// Deviation (in percent) at which a metric's normalized score reaches 0.
pub const DEVIATION_TOLERANCE_PERCENT: f32 = 40.0;

/// Which side of the reference range a value falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationDirection {
    Below,
    Within,
    Above,
}

/// A metric together with its deviation from the reference range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMetric {
    #[serde(flatten)]
    pub metric: Metric,
    /// 0 within range, otherwise relative distance to the nearer bound in percent.
    pub deviation_percent: f32,
    pub direction: DeviationDirection,
    /// In [0, 1]; 1 within range, 0 at or beyond the tolerance.
    pub normalized_score: f32,
}

impl ScoredMetric {
    pub fn label(&self) -> &str {
        &self.metric.label
    }

    pub fn value(&self) -> f32 {
        self.metric.value
    }

    pub fn range(&self) -> Range {
        self.metric.range
    }
}

/// Side of `range` that `value` falls on.
pub fn direction(value: f32, range: &Range) -> DeviationDirection {
    if value < range.min() {
        DeviationDirection::Below
    } else if value > range.max() {
        DeviationDirection::Above
    } else {
        DeviationDirection::Within
    }
}

/// `|value - bound| / bound * 100` against the nearer bound, or 0 inside the range.
pub fn deviation_percent(value: f32, range: &Range) -> f32 {
    let bound = match direction(value, range) {
        DeviationDirection::Below => range.min(),
        DeviationDirection::Above => range.max(),
        // NaN compares false against both bounds and lands here.
        DeviationDirection::Within => return if value.is_nan() { f32::NAN } else { 0.0 },
    };
    ((value - bound) / bound).abs() * 100.0
}

/// Linear score: 1 at 0% deviation, 0 at [`DEVIATION_TOLERANCE_PERCENT`] or more.
/// Non-finite deviations score 0.
pub fn normalized_score(deviation_percent: f32) -> f32 {
    if !deviation_percent.is_finite() {
        return 0.0;
    }
    (1.0 - deviation_percent / DEVIATION_TOLERANCE_PERCENT).clamp(0.0, 1.0)
}

pub fn score_metric(metric: Metric) -> ScoredMetric {
    let deviation = deviation_percent(metric.value, &metric.range);
    ScoredMetric {
        direction: direction(metric.value, &metric.range),
        normalized_score: normalized_score(deviation),
        deviation_percent: deviation,
        metric,
    }
}

pub fn score_metrics(metrics: Vec<Metric>) -> Vec<ScoredMetric> {
    metrics.into_iter().map(score_metric).collect()
}

/// Mean normalized score scaled to [0, 100]. An empty list scores 0.
pub fn match_score(scored: &[ScoredMetric]) -> f32 {
    if scored.is_empty() {
        return 0.0;
    }
    let sum: f32 = scored.iter().map(|s| s.normalized_score).sum();
    sum / scored.len() as f32 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::MetricKind;

    fn metric(value: f32, min: f32, max: f32) -> Metric {
        Metric {
            kind: MetricKind::NoseWidth,
            label: "test".into(),
            value,
            range: Range::new(min, max).unwrap(),
        }
    }

    #[test]
    fn test_within_range_scores_one() {
        let s = score_metric(metric(0.42, 0.36, 0.48));
        assert_eq!(s.deviation_percent, 0.0);
        assert_eq!(s.normalized_score, 1.0);
        assert_eq!(s.direction, DeviationDirection::Within);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(score_metric(metric(0.36, 0.36, 0.48)).deviation_percent, 0.0);
        assert_eq!(score_metric(metric(0.48, 0.36, 0.48)).deviation_percent, 0.0);
    }

    #[test]
    fn test_forty_percent_above_max_scores_zero() {
        let s = score_metric(metric(0.48 * 1.4, 0.36, 0.48));
        assert!((s.deviation_percent - 40.0).abs() < 1e-3, "got {}", s.deviation_percent);
        assert!(s.normalized_score.abs() < 1e-4);
        assert_eq!(s.direction, DeviationDirection::Above);
    }

    #[test]
    fn test_below_min_uses_min_bound() {
        // 0.27 is 25% below 0.36
        let s = score_metric(metric(0.27, 0.36, 0.48));
        assert!((s.deviation_percent - 25.0).abs() < 1e-3);
        assert!((s.normalized_score - 0.375).abs() < 1e-4);
        assert_eq!(s.direction, DeviationDirection::Below);
    }

    #[test]
    fn test_score_clamped_past_tolerance() {
        let s = score_metric(metric(2.0, 0.36, 0.48));
        assert!(s.deviation_percent > 40.0);
        assert_eq!(s.normalized_score, 0.0);
    }

    #[test]
    fn test_nan_value_scores_zero() {
        let s = score_metric(metric(f32::NAN, 0.36, 0.48));
        assert_eq!(s.normalized_score, 0.0);
        assert!(!match_score(&[s]).is_nan());
    }

    #[test]
    fn test_match_score_empty_is_zero() {
        assert_eq!(match_score(&[]), 0.0);
    }

    #[test]
    fn test_match_score_all_in_range_is_hundred() {
        let scored = score_metrics(vec![
            metric(0.40, 0.36, 0.48),
            metric(0.20, 0.18, 0.30),
            metric(1.00, 0.92, 1.08),
        ]);
        assert!((match_score(&scored) - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_match_score_is_mean() {
        let scored = score_metrics(vec![metric(0.40, 0.36, 0.48), metric(2.0, 0.36, 0.48)]);
        assert!((match_score(&scored) - 50.0).abs() < 1e-4);
    }
}
