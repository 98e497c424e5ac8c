//! facemetry-core — Facial proportion analysis.
//!
//! Turns a 68-point landmark set into scale-invariant ratios, scores them
//! against a calibration table, classifies a coarse face shape and exports
//! the result as CSV or JSON. Everything here is synchronous and pure.

pub mod calibration;
pub mod export;
pub mod geometry;
pub mod landmarks;
pub mod metrics;
pub mod prediction;
pub mod report;
pub mod scoring;
pub mod shape;
pub mod status;

pub use calibration::{CalibrationError, CalibrationTable, MetricGroup, MetricKind, Range};
pub use export::{ExportError, ExportRow};
pub use geometry::{distance, midpoint, safe_divide, Point};
pub use landmarks::{LandmarkError, LandmarkSet};
pub use metrics::{Metric, MetricEngine, MetricError};
pub use prediction::{rank_predictions, Prediction, PredictionError};
pub use report::{analyze, AnalysisReport};
pub use scoring::{match_score, DeviationDirection, ScoredMetric};
pub use shape::{FaceShape, ShapeClassifier, ShapeRatios, ShapeRule};
pub use status::StatusCategory;
