//! CSV and JSON serialization of scored metric lists.
//!
//! Both formats carry the same five fields per metric, in report order:
//! `label, value, range_min, range_max, deviation_percent`.

use crate::scoring::ScoredMetric;
use crate::status::StatusCategory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CSV_HEADER: &str = "label,value,range_min,range_max,deviation_percent";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv line {line}: {reason}")]
    Csv { line: usize, reason: String },
}

impl ExportError {
    pub fn category(&self) -> StatusCategory {
        StatusCategory::Permanent
    }
}

/// One exported metric. Range and deviation are optional so that rows from
/// hand-edited or partial exports still parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub label: String,
    pub value: f32,
    pub range_min: Option<f32>,
    pub range_max: Option<f32>,
    pub deviation_percent: Option<f32>,
}

impl From<&ScoredMetric> for ExportRow {
    fn from(m: &ScoredMetric) -> Self {
        let range = m.range();
        Self {
            label: m.label().to_string(),
            value: m.value(),
            range_min: Some(range.min()),
            range_max: Some(range.max()),
            deviation_percent: m.deviation_percent.is_finite().then_some(m.deviation_percent),
        }
    }
}

pub fn rows(metrics: &[ScoredMetric]) -> Vec<ExportRow> {
    metrics.iter().map(ExportRow::from).collect()
}

/// Render metrics as CSV: quoted label, two decimals for value and range,
/// one decimal for deviation, empty fields for missing values.
pub fn to_csv(metrics: &[ScoredMetric]) -> String {
    rows_to_csv(&rows(metrics))
}

pub fn rows_to_csv(rows: &[ExportRow]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + rows.len() * 48);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&quote(&row.label));
        out.push(',');
        out.push_str(&format!("{:.2}", row.value));
        out.push(',');
        out.push_str(&optional(row.range_min, 2));
        out.push(',');
        out.push_str(&optional(row.range_max, 2));
        out.push(',');
        out.push_str(&optional(row.deviation_percent, 1));
        out.push('\n');
    }
    out
}

/// Pretty-printed JSON array of [`ExportRow`]s.
pub fn to_json(metrics: &[ScoredMetric]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&rows(metrics))?)
}

pub fn parse_json(src: &str) -> Result<Vec<ExportRow>, ExportError> {
    Ok(serde_json::from_str(src)?)
}

/// Parse text produced by [`to_csv`]. The header line is required.
pub fn parse_csv(src: &str) -> Result<Vec<ExportRow>, ExportError> {
    let mut lines = src.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    match lines.next() {
        Some((_, header)) if header.trim() == CSV_HEADER => {}
        Some((n, _)) => {
            return Err(ExportError::Csv {
                line: n + 1,
                reason: "unexpected header".into(),
            })
        }
        None => {
            return Err(ExportError::Csv {
                line: 1,
                reason: "missing header".into(),
            })
        }
    }

    lines
        .map(|(n, line)| parse_row(line).map_err(|reason| ExportError::Csv { line: n + 1, reason }))
        .collect()
}

fn parse_row(line: &str) -> Result<ExportRow, String> {
    let fields = split_fields(line)?;
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, got {}", fields.len()));
    }
    let value = parse_number(&fields[1])?.ok_or("value is empty")?;
    Ok(ExportRow {
        label: fields[0].clone(),
        value,
        range_min: parse_number(&fields[2])?,
        range_max: parse_number(&fields[3])?,
        deviation_percent: parse_number(&fields[4])?,
    })
}

fn parse_number(field: &str) -> Result<Option<f32>, String> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse::<f32>()
        .map(Some)
        .map_err(|e| format!("{field:?}: {e}"))
}

/// Split one CSV line, honouring double-quoted fields with `""` escapes.
fn split_fields(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".into());
    }
    fields.push(current);
    Ok(fields)
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn optional(v: Option<f32>, decimals: usize) -> String {
    v.map(|v| format!("{v:.decimals$}")).unwrap_or_default()
}
