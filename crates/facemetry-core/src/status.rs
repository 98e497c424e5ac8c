//! User-facing failure categories shared by every error type in the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse category used to pick a status message for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    /// The caller supplied something unusable (bad sample, bad class name).
    Validation,
    /// A retry may succeed (network down, server busy).
    Transient,
    /// Retrying the same request will not help.
    Permanent,
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusCategory::Validation => "validation",
            StatusCategory::Transient => "transient",
            StatusCategory::Permanent => "permanent",
        })
    }
}
