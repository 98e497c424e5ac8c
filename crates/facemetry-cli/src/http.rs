//! Multipart HTTP upload to the registration endpoint.

use facemetry_queue::{UploadError, UploadRequest, UploadTransport};
use reqwest::multipart::{Form, Part};
use std::time::Duration;

pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

fn form(request: UploadRequest) -> Form {
    let file = Part::bytes(request.file).file_name(request.file_name.clone());
    Form::new()
        .text("userId", request.user_id)
        .text("className", request.class_name)
        .text("method", request.method.as_str())
        .part("file", file)
        .text("fileName", request.file_name)
}

impl UploadTransport for HttpTransport {
    async fn upload(&self, request: UploadRequest) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form(request))
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }
        tracing::debug!(status = status.as_u16(), "upload accepted");
        Ok(())
    }
}
