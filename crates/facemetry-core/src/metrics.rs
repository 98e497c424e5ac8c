//! Metric engine: landmark set → ordered list of dimensionless ratios.
//!
//! Every width and height is normalized by the face width (jaw[0] to jaw[16]).
//! A zero face width is reported as [`MetricError::DegenerateGeometry`]; all
//! other denominators go through [`safe_divide`] with a fallback divisor of 1.

use crate::calibration::{CalibrationTable, MetricKind, Range};
use crate::geometry::{distance, safe_divide, Point, ZERO_EPSILON};
use crate::landmarks::LandmarkSet;
use crate::status::StatusCategory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Divisor substituted for a collapsed secondary segment.
const SEGMENT_FALLBACK_DIVISOR: f32 = 1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("degenerate geometry: {segment} has zero length")]
    DegenerateGeometry { segment: &'static str },
    #[error("landmark coordinates contain NaN or infinity")]
    NonFiniteLandmarks,
    #[error("metric {label:?} evaluated to a non-finite value")]
    NonFiniteValue { label: String },
}

impl MetricError {
    pub fn category(&self) -> StatusCategory {
        StatusCategory::Validation
    }
}

/// One computed ratio with its reference range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub kind: MetricKind,
    pub label: String,
    pub value: f32,
    pub range: Range,
}

/// Reference positions and segment lengths shared by all formulas.
#[derive(Debug, Clone, Copy)]
struct FaceFrame {
    face_width: f32,
    left_eye_center: Point,
    right_eye_center: Point,
    midline_x: f32,
    brow_top: Point,
    chin: Point,
    /// Vertical segments, all non-negative.
    brow_to_nose: f32,
    eye_to_nose: f32,
    nose_to_mouth: f32,
    mouth_to_chin: f32,
}

impl FaceFrame {
    fn measure(lm: &LandmarkSet) -> Result<Self, MetricError> {
        if !lm.is_finite() {
            return Err(MetricError::NonFiniteLandmarks);
        }

        let face_width = distance(lm.jaw[0], lm.jaw[16]);
        if face_width < ZERO_EPSILON {
            return Err(MetricError::DegenerateGeometry {
                segment: "face width (jaw[0] to jaw[16])",
            });
        }

        let left_eye_center = lm.left_eye_center();
        let right_eye_center = lm.right_eye_center();
        let eye_line_y = (left_eye_center.y + right_eye_center.y) / 2.0;
        let nose_y = lm.nose_tip().y;
        let mouth_y = lm.mouth_center().y;
        let brow_top = lm.brow_top();
        let chin = lm.chin();

        Ok(Self {
            face_width,
            left_eye_center,
            right_eye_center,
            midline_x: (lm.jaw[0].x + lm.jaw[16].x) / 2.0,
            brow_top,
            chin,
            brow_to_nose: (nose_y - brow_top.y).abs(),
            eye_to_nose: (nose_y - eye_line_y).abs(),
            nose_to_mouth: (mouth_y - nose_y).abs(),
            mouth_to_chin: (chin.y - mouth_y).abs(),
        })
    }

    fn thirds_total(&self) -> f32 {
        self.brow_to_nose + self.nose_to_mouth + self.mouth_to_chin
    }

    fn width_ratio(&self, a: Point, b: Point) -> f32 {
        distance(a, b) / self.face_width
    }

    fn midline_distance(&self, p: Point) -> f32 {
        distance(p, Point::new(self.midline_x, p.y))
    }
}

fn evaluate(kind: MetricKind, lm: &LandmarkSet, f: &FaceFrame) -> f32 {
    match kind {
        MetricKind::EyeDistance => f.width_ratio(f.left_eye_center, f.right_eye_center),
        MetricKind::NoseWidth => f.width_ratio(lm.nose[3], lm.nose[5]),
        MetricKind::MouthWidth => f.width_ratio(lm.mouth[0], lm.mouth[6]),
        MetricKind::EyeNoseToNoseMouth => {
            safe_divide(f.eye_to_nose, f.nose_to_mouth, SEGMENT_FALLBACK_DIVISOR)
        }
        MetricKind::EyeNoseToMouthChin => {
            safe_divide(f.eye_to_nose, f.mouth_to_chin, SEGMENT_FALLBACK_DIVISOR)
        }
        MetricKind::UpperThird => {
            safe_divide(f.brow_to_nose, f.thirds_total(), SEGMENT_FALLBACK_DIVISOR)
        }
        MetricKind::MiddleThird => {
            safe_divide(f.nose_to_mouth, f.thirds_total(), SEGMENT_FALLBACK_DIVISOR)
        }
        MetricKind::LowerThird => {
            safe_divide(f.mouth_to_chin, f.thirds_total(), SEGMENT_FALLBACK_DIVISOR)
        }
        MetricKind::FaceHeightToWidth => f.width_ratio(f.brow_top, f.chin),
        MetricKind::JawToFaceWidth => f.width_ratio(lm.jaw[4], lm.jaw[12]),
        MetricKind::ForeheadToFaceWidth => f.width_ratio(lm.left_eyebrow[0], lm.right_eyebrow[4]),
        MetricKind::EyeSymmetry => safe_divide(
            f.midline_distance(f.left_eye_center),
            f.midline_distance(f.right_eye_center),
            SEGMENT_FALLBACK_DIVISOR,
        ),
    }
}

/// Computes every metric in its calibration table, in table order.
#[derive(Debug, Clone, Default)]
pub struct MetricEngine {
    table: CalibrationTable,
}

impl MetricEngine {
    pub fn new(table: CalibrationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Compute the full metric list. Either every configured metric is
    /// returned with a finite value, or an error is.
    pub fn compute(&self, landmarks: &LandmarkSet) -> Result<Vec<Metric>, MetricError> {
        let frame = FaceFrame::measure(landmarks)?;
        tracing::debug!(face_width = frame.face_width, "computing face metrics");

        self.table
            .entries()
            .iter()
            .map(|entry| {
                let value = evaluate(entry.kind, landmarks, &frame);
                if !value.is_finite() {
                    return Err(MetricError::NonFiniteValue {
                        label: entry.label.clone(),
                    });
                }
                tracing::debug!(metric = ?entry.kind, value, "metric computed");
                Ok(Metric {
                    kind: entry.kind,
                    label: entry.label.clone(),
                    value,
                    range: entry.range,
                })
            })
            .collect()
    }
}
