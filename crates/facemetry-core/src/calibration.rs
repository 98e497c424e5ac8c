//! Calibration table: which metrics the engine computes, in which order, and
//! the reference range each one is scored against.
//!
//! The default table is compiled in. Alternative tables are TOML files with one
//! `[[metric]]` section per entry (see `contrib/calibration/default.toml`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("invalid range: min {min} must be positive and below max {max}")]
    InvalidBounds { min: f32, max: f32 },
    #[error("invalid range for {label:?}: min {min} must be positive and below max {max}")]
    InvalidRange { label: String, min: f32, max: f32 },
    #[error("metric {0:?} appears more than once in the calibration table")]
    DuplicateMetric(MetricKind),
    #[error("unknown metric group: {0}")]
    UnknownGroup(String),
    #[error("calibration TOML: {0}")]
    Parse(String),
}

/// Reference bounds for one metric. Always `0 < min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct Range {
    min: f32,
    max: f32,
}

impl Range {
    pub fn new(min: f32, max: f32) -> Result<Self, CalibrationError> {
        if min.is_finite() && max.is_finite() && min > 0.0 && min < max {
            Ok(Self { min, max })
        } else {
            Err(CalibrationError::InvalidBounds { min, max })
        }
    }

    const fn fixed(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Deserialize)]
struct RawRange {
    min: f32,
    max: f32,
}

impl TryFrom<RawRange> for Range {
    type Error = CalibrationError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Range::new(raw.min, raw.max)
    }
}

/// Family a metric belongs to. Tables can be narrowed to a subset of groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricGroup {
    /// Widths and heights relative to face width.
    Proportion,
    /// Vertical eye/nose/mouth/chin segment ratios.
    Vertical,
    /// Upper/middle/lower facial thirds.
    Thirds,
    /// Left/right eye distance from the facial midline.
    Symmetry,
}

impl MetricGroup {
    pub const ALL: [MetricGroup; 4] = [
        MetricGroup::Proportion,
        MetricGroup::Vertical,
        MetricGroup::Thirds,
        MetricGroup::Symmetry,
    ];
}

impl fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricGroup::Proportion => "proportion",
            MetricGroup::Vertical => "vertical",
            MetricGroup::Thirds => "thirds",
            MetricGroup::Symmetry => "symmetry",
        };
        f.write_str(name)
    }
}

impl FromStr for MetricGroup {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricGroup::ALL
            .into_iter()
            .find(|g| g.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CalibrationError::UnknownGroup(s.to_string()))
    }
}

/// Formula identifier. Each kind maps to exactly one computation in
/// [`crate::metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    EyeDistance,
    NoseWidth,
    MouthWidth,
    EyeNoseToNoseMouth,
    EyeNoseToMouthChin,
    UpperThird,
    MiddleThird,
    LowerThird,
    FaceHeightToWidth,
    JawToFaceWidth,
    ForeheadToFaceWidth,
    EyeSymmetry,
}

impl MetricKind {
    pub fn group(self) -> MetricGroup {
        match self {
            MetricKind::EyeDistance
            | MetricKind::NoseWidth
            | MetricKind::MouthWidth
            | MetricKind::FaceHeightToWidth
            | MetricKind::JawToFaceWidth
            | MetricKind::ForeheadToFaceWidth => MetricGroup::Proportion,
            MetricKind::EyeNoseToNoseMouth | MetricKind::EyeNoseToMouthChin => {
                MetricGroup::Vertical
            }
            MetricKind::UpperThird | MetricKind::MiddleThird | MetricKind::LowerThird => {
                MetricGroup::Thirds
            }
            MetricKind::EyeSymmetry => MetricGroup::Symmetry,
        }
    }
}

/// One row of the calibration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub kind: MetricKind,
    pub label: String,
    pub range: Range,
}

const DEFAULT_ENTRIES: [(MetricKind, &str, Range); 12] = [
    (MetricKind::EyeDistance, "Eye distance / face width", Range::fixed(0.36, 0.48)),
    (MetricKind::NoseWidth, "Nose width / face width", Range::fixed(0.18, 0.30)),
    (MetricKind::MouthWidth, "Mouth width / face width", Range::fixed(0.30, 0.46)),
    (MetricKind::EyeNoseToNoseMouth, "Eye-nose / nose-mouth (vertical)", Range::fixed(0.80, 1.20)),
    (MetricKind::EyeNoseToMouthChin, "Eye-nose / mouth-chin (vertical)", Range::fixed(0.80, 1.30)),
    (MetricKind::UpperThird, "Upper third (brow-nose)", Range::fixed(0.30, 0.36)),
    (MetricKind::MiddleThird, "Middle third (nose-mouth)", Range::fixed(0.30, 0.36)),
    (MetricKind::LowerThird, "Lower third (mouth-chin)", Range::fixed(0.30, 0.36)),
    (MetricKind::FaceHeightToWidth, "Face height / width", Range::fixed(1.15, 1.45)),
    (MetricKind::JawToFaceWidth, "Jaw width / face width", Range::fixed(0.70, 0.90)),
    (MetricKind::ForeheadToFaceWidth, "Forehead width / face width", Range::fixed(0.70, 0.95)),
    (MetricKind::EyeSymmetry, "Left/right eye symmetry", Range::fixed(0.92, 1.08)),
];

/// Ordered calibration table. Entry order is the report and export order.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES
                .iter()
                .map(|&(kind, label, range)| CalibrationEntry {
                    kind,
                    label: label.to_string(),
                    range,
                })
                .collect(),
        }
    }
}

/// On-disk TOML layout.
#[derive(Deserialize)]
struct CalibrationFile {
    metric: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawEntry {
    kind: MetricKind,
    label: Option<String>,
    min: f32,
    max: f32,
}

impl CalibrationTable {
    /// Build a table from explicit entries, rejecting duplicate metric kinds.
    pub fn new(entries: Vec<CalibrationEntry>) -> Result<Self, CalibrationError> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.kind == entry.kind) {
                return Err(CalibrationError::DuplicateMetric(entry.kind));
            }
        }
        Ok(Self { entries })
    }

    /// Parse a TOML calibration asset. Entries without a `label` take the
    /// default label for their kind.
    pub fn from_toml_str(src: &str) -> Result<Self, CalibrationError> {
        let file: CalibrationFile =
            toml::from_str(src).map_err(|e| CalibrationError::Parse(e.to_string()))?;

        let entries = file
            .metric
            .into_iter()
            .map(|raw| {
                let label = raw
                    .label
                    .unwrap_or_else(|| default_label(raw.kind).to_string());
                let range = Range::new(raw.min, raw.max).map_err(|_| {
                    CalibrationError::InvalidRange {
                        label: label.clone(),
                        min: raw.min,
                        max: raw.max,
                    }
                })?;
                Ok(CalibrationEntry {
                    kind: raw.kind,
                    label,
                    range,
                })
            })
            .collect::<Result<Vec<_>, CalibrationError>>()?;

        let table = Self::new(entries)?;
        tracing::debug!(metrics = table.len(), "calibration table parsed");
        Ok(table)
    }

    /// Keep only entries whose group is in `groups`, preserving order.
    pub fn with_groups(&self, groups: &[MetricGroup]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| groups.contains(&e.kind.group()))
                .cloned()
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    pub fn get(&self, kind: MetricKind) -> Option<&CalibrationEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn default_label(kind: MetricKind) -> &'static str {
    DEFAULT_ENTRIES
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, label, _)| *label)
        .unwrap_or("metric")
}
