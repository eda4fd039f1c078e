//! HTTP transport to a DID registrar.
//!
//! - `POST {base}/1.0/{create|update|deactivate}` submits a job.
//! - `GET  {base}/1.0/jobs/{jobId}` reports its status.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::poller::{JobOperation, JobTransport};
use crate::TransportError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpRegistrarTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistrarTransport {
    /// # Errors
    /// Returns [`TransportError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl JobTransport for HttpRegistrarTransport {
    async fn submit(&self, operation: JobOperation, body: &Value) -> Result<Value, TransportError> {
        let url = format!("{}/1.0/{}", self.base_url, operation.as_str());
        debug!(%url, "submitting registrar job");
        let response = self.client.post(&url).json(body).send().await?;
        Self::read_json(response).await
    }

    async fn status(&self, job_id: &str) -> Result<Value, TransportError> {
        let url = format!("{}/1.0/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }
}
