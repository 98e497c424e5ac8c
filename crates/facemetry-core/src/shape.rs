//! Rule-based face-shape classification.
//!
//! Rules are evaluated in order and the first match wins; the order of the
//! default list is part of its meaning and must not be re-sorted.
//!
//! A calibration TOML may carry its own list as `[[shape_rule]]` sections,
//! e.g. `rule = "long"` with `min_height = 1.45`.

use crate::calibration::{CalibrationError, MetricKind};
use crate::metrics::Metric;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceShape {
    Long,
    Heart,
    /// Square or rectangular jaw.
    Angular,
    Round,
    Oval,
}

impl fmt::Display for FaceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaceShape::Long => "long",
            FaceShape::Heart => "heart",
            FaceShape::Angular => "angular",
            FaceShape::Round => "round",
            FaceShape::Oval => "oval",
        })
    }
}

/// The three ratios the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeRatios {
    /// Face height / face width (H).
    pub height_to_width: f32,
    /// Jaw width / face width (J).
    pub jaw_to_width: f32,
    /// Forehead width / face width (F).
    pub forehead_to_width: f32,
}

impl ShapeRatios {
    /// Pick H, J and F out of a metric list. `None` if any of them is missing.
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a Metric>) -> Option<Self> {
        let (mut h, mut j, mut f) = (None, None, None);
        for m in metrics {
            match m.kind {
                MetricKind::FaceHeightToWidth => h = Some(m.value),
                MetricKind::JawToFaceWidth => j = Some(m.value),
                MetricKind::ForeheadToFaceWidth => f = Some(m.value),
                _ => {}
            }
        }
        Some(Self {
            height_to_width: h?,
            jaw_to_width: j?,
            forehead_to_width: f?,
        })
    }
}

/// One step of the decision list.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ShapeRule {
    /// H above `min_height` → long.
    Long { min_height: f32 },
    /// F above J + `margin` → heart.
    Heart { margin: f32 },
    /// J above `min_jaw` → angular.
    Angular { min_jaw: f32 },
    /// H below `max_height` → round.
    Round { max_height: f32 },
}

impl ShapeRule {
    fn matches(&self, r: &ShapeRatios) -> bool {
        match *self {
            ShapeRule::Long { min_height } => r.height_to_width > min_height,
            ShapeRule::Heart { margin } => r.forehead_to_width > r.jaw_to_width + margin,
            ShapeRule::Angular { min_jaw } => r.jaw_to_width > min_jaw,
            ShapeRule::Round { max_height } => r.height_to_width < max_height,
        }
    }

    fn shape(&self) -> FaceShape {
        match self {
            ShapeRule::Long { .. } => FaceShape::Long,
            ShapeRule::Heart { .. } => FaceShape::Heart,
            ShapeRule::Angular { .. } => FaceShape::Angular,
            ShapeRule::Round { .. } => FaceShape::Round,
        }
    }
}

/// Ordered decision list with an `oval` fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeClassifier {
    rules: Vec<ShapeRule>,
}

impl Default for ShapeClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                ShapeRule::Long { min_height: 1.45 },
                ShapeRule::Heart { margin: 0.08 },
                ShapeRule::Angular { min_jaw: 0.88 },
                ShapeRule::Round { max_height: 1.15 },
            ],
        }
    }
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    shape_rule: Vec<ShapeRule>,
}

impl ShapeClassifier {
    pub fn new(rules: Vec<ShapeRule>) -> Self {
        Self { rules }
    }

    /// Read `[[shape_rule]]` sections from a calibration TOML, in file order.
    /// A file without any falls back to the default list.
    pub fn from_toml_str(src: &str) -> Result<Self, CalibrationError> {
        let file: RuleFile =
            toml::from_str(src).map_err(|e| CalibrationError::Parse(e.to_string()))?;
        if file.shape_rule.is_empty() {
            return Ok(Self::default());
        }
        tracing::debug!(rules = file.shape_rule.len(), "shape rules parsed");
        Ok(Self::new(file.shape_rule))
    }

    pub fn rules(&self) -> &[ShapeRule] {
        &self.rules
    }

    pub fn classify(&self, ratios: &ShapeRatios) -> FaceShape {
        self.rules
            .iter()
            .find(|rule| rule.matches(ratios))
            .map(ShapeRule::shape)
            .unwrap_or(FaceShape::Oval)
    }

    /// Classify straight from a metric list; `None` if H, J or F was not computed.
    pub fn classify_metrics<'a>(
        &self,
        metrics: impl IntoIterator<Item = &'a Metric>,
    ) -> Option<FaceShape> {
        ShapeRatios::from_metrics(metrics).map(|r| self.classify(&r))
    }
}
