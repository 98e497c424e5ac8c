//! End-to-end analysis of one landmark set and its human-readable rendering.

use crate::landmarks::LandmarkSet;
use crate::metrics::{MetricEngine, MetricError};
use crate::scoring::{match_score, score_metrics, DeviationDirection, ScoredMetric};
use crate::shape::{FaceShape, ShapeClassifier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of analysing one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metrics: Vec<ScoredMetric>,
    /// Aggregate score in [0, 100].
    pub match_score: f32,
    /// `None` when the calibration table omits one of the ratios the
    /// classifier needs.
    pub face_shape: Option<FaceShape>,
}

impl AnalysisReport {
    /// Number of metrics inside their reference range.
    pub fn within_range(&self) -> usize {
        self.metrics
            .iter()
            .filter(|m| m.direction == DeviationDirection::Within)
            .count()
    }
}

/// Metrics, deviations, match score and face shape for one landmark set.
pub fn analyze(
    landmarks: &LandmarkSet,
    engine: &MetricEngine,
    classifier: &ShapeClassifier,
) -> Result<AnalysisReport, MetricError> {
    let metrics = engine.compute(landmarks)?;
    let face_shape = classifier.classify_metrics(&metrics);
    let metrics = score_metrics(metrics);
    let match_score = match_score(&metrics);

    tracing::info!(
        metrics = metrics.len(),
        match_score,
        face_shape = ?face_shape,
        "face analysed"
    );

    Ok(AnalysisReport {
        metrics,
        match_score,
        face_shape,
    })
}

fn label_width(metrics: &[ScoredMetric]) -> usize {
    metrics.iter().map(|m| m.label().len()).max().unwrap_or(0)
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Match score: {:.1} / 100", self.match_score)?;
        match self.face_shape {
            Some(shape) => writeln!(f, "Face shape:  {shape}")?,
            None => writeln!(f, "Face shape:  n/a")?,
        }
        writeln!(
            f,
            "In range:    {} of {}",
            self.within_range(),
            self.metrics.len()
        )?;
        writeln!(f)?;

        let width = label_width(&self.metrics);
        for m in &self.metrics {
            let range = m.range();
            let verdict = match m.direction {
                DeviationDirection::Within => "within range".to_string(),
                DeviationDirection::Above => format!("+{:.1}% above", m.deviation_percent),
                DeviationDirection::Below => format!("-{:.1}% below", m.deviation_percent),
            };
            writeln!(
                f,
                "{:<width$}  {:>6.2}  [{:.2} - {:.2}]  {}",
                m.label(),
                m.value(),
                range.min(),
                range.max(),
                verdict,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::synthetic_face;

    #[test]
    fn test_analyze_synthetic_face() {
        let report = analyze(
            &synthetic_face(),
            &MetricEngine::default(),
            &ShapeClassifier::default(),
        )
        .unwrap();
        assert_eq!(report.metrics.len(), 12);
        assert_eq!(report.face_shape, Some(FaceShape::Oval));
        assert!(report.match_score > 0.0 && report.match_score < 100.0);
        // eye distance, nose, mouth, face height, jaw, forehead, lower third, symmetry
        assert_eq!(report.within_range(), 8);
    }

    #[test]
    fn test_display_lists_every_metric() {
        let report = analyze(
            &synthetic_face(),
            &MetricEngine::default(),
            &ShapeClassifier::default(),
        )
        .unwrap();
        let text = report.to_string();
        assert!(text.starts_with("Match score: "));
        assert!(text.contains("Face shape:  oval"));
        for m in &report.metrics {
            assert!(text.contains(m.label()), "missing {}", m.label());
        }
        assert!(text.contains("% above"));
        assert!(text.contains("% below"));
    }

    #[test]
    fn test_degenerate_face_reports_error() {
        let mut points = synthetic_face().to_points();
        points[0] = points[16];
        let lm = LandmarkSet::from_points(&points).unwrap();
        let result = analyze(&lm, &MetricEngine::default(), &ShapeClassifier::default());
        assert!(matches!(result, Err(MetricError::DegenerateGeometry { .. })));
    }
}
