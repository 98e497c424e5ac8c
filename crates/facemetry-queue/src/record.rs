use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How a sample was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMethod {
    Camera,
    Upload,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::Camera => "camera",
            CaptureMethod::Upload => "upload",
        }
    }
}

impl fmt::Display for CaptureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "camera" => Ok(CaptureMethod::Camera),
            "upload" => Ok(CaptureMethod::Upload),
            other => Err(format!("unknown capture method: {other} (expected camera or upload)")),
        }
    }
}

/// One registered sample. Records are only ever appended; `synced` flips to
/// true once the remote store has accepted the upload.
///
/// Serialized in camelCase, which is also the layout of the persisted pending
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    /// Snapshots written without ids get a fresh one on load.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub class_name: String,
    pub method: CaptureMethod,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub synced: bool,
}
