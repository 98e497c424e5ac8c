//! Upload contract for the remote registration endpoint.
//!
//! The endpoint takes a multipart POST with the fields `userId`, `className`,
//! `method`, `file` and `fileName`. Any 2xx response is success. How the
//! request is actually sent is up to the implementation.

use crate::record::CaptureMethod;
use facemetry_core::StatusCategory;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server rejected upload with status {0}")]
    Status(u16),
    #[error("upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Transport failures, cancellations, timeouts, throttling and 5xx are
    /// worth retrying; other statuses are not.
    pub fn category(&self) -> StatusCategory {
        match self {
            UploadError::Transport(_) | UploadError::Cancelled => StatusCategory::Transient,
            UploadError::Status(408 | 429) => StatusCategory::Transient,
            UploadError::Status(s) if *s >= 500 => StatusCategory::Transient,
            UploadError::Status(_) => StatusCategory::Permanent,
        }
    }
}

/// One sample upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub user_id: String,
    pub class_name: String,
    pub method: CaptureMethod,
    pub file_name: String,
    pub file: Vec<u8>,
}

/// Sends a sample to the remote store. Implementations decide timeouts.
pub trait UploadTransport: Send + Sync {
    fn upload(&self, request: UploadRequest)
        -> impl Future<Output = Result<(), UploadError>> + Send;
}
