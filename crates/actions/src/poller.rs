//! Submit / poll / timeout state machine for long-running external jobs.
//!
//! ```text
//! Submitted ─┬─ ImmediateFailure
//!            └─ Waiting ─┬─ Finished
//!                        ├─ Failed
//!                        ├─ TimedOut
//!                        └─ Cancelled
//! ```
//!
//! A transport error on a status query ends the operation immediately; status
//! queries are never retried.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{ActionError, TransportError};

/// Default delay between two status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default ceiling on the total time spent waiting for a job.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Kind of job submitted to the external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOperation {
    Create,
    Update,
    Deactivate,
}

impl JobOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Deactivate => "deactivate",
        }
    }
}

impl fmt::Display for JobOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport to a service that runs jobs asynchronously.
///
/// Both calls return the raw JSON body; the poller only inspects
/// `jobId`, `didState.state` and `didState.reason`.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn submit(&self, operation: JobOperation, body: &Value) -> Result<Value, TransportError>;

    async fn status(&self, job_id: &str) -> Result<Value, TransportError>;
}

/// The fields of a job status response the poller cares about.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub did_state: Option<DidState>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DidState {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Job state as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Finished,
    Failed { reason: Option<String> },
    /// `wait`, empty, or anything unrecognised.
    Waiting,
}

impl JobStatusResponse {
    fn parse(raw: &Value) -> Result<Self, ActionError> {
        serde_json::from_value(raw.clone())
            .map_err(|e| ActionError::External(format!("malformed job status response: {e}")))
    }

    pub fn job_state(&self) -> JobState {
        let did_state = self.did_state.as_ref();
        match did_state.and_then(|s| s.state.as_deref()) {
            Some("finished") => JobState::Finished,
            Some("failed") => JobState::Failed {
                reason: did_state.and_then(|s| s.reason.clone()),
            },
            _ => JobState::Waiting,
        }
    }
}

/// Drives one job from submission to a terminal state.
#[derive(Debug, Clone, Default)]
pub struct AsyncJobPoller {
    config: PollerConfig,
}

impl AsyncJobPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Submit `body` and poll until the job finishes, fails, times out or is
    /// cancelled. `Ok` carries the final status response verbatim.
    ///
    /// # Errors
    /// - [`ActionError::External`] on immediate failure, invalid job id,
    ///   transport error or a `failed` job.
    /// - [`ActionError::TimedOut`] when the ceiling elapses.
    /// - [`ActionError::Cancelled`] when `cancel` fires; the caller must stop.
    #[instrument(skip(self, transport, body, cancel), fields(operation = %operation))]
    pub async fn run(
        &self,
        transport: &dyn JobTransport,
        operation: JobOperation,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<String, ActionError> {
        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled("operation cancelled before submission".into()));
        }

        let submitted = tokio::select! {
            result = transport.submit(operation, body) => result
                .map_err(|e| ActionError::External(format!("{operation} submission failed: {e}")))?,
            _ = cancel.cancelled() => {
                warn!("cancelled while submitting");
                return Err(ActionError::Cancelled(format!("{operation} cancelled during submission")));
            }
        };
        let response = JobStatusResponse::parse(&submitted)?;

        if let JobState::Failed { reason } = response.job_state() {
            let message = reason.unwrap_or_else(|| format!("{operation} rejected by registrar"));
            warn!(%message, "job failed on submission");
            return Err(ActionError::External(message));
        }

        let job_id = match response.job_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => return Err(ActionError::External("invalid job id".into())),
        };

        info!(%job_id, "job submitted, polling for status");
        self.poll(transport, &job_id, cancel).await
    }

    async fn poll(
        &self,
        transport: &dyn JobTransport,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ActionError> {
        let started = Instant::now();

        while started.elapsed() < self.config.timeout {
            if cancel.is_cancelled() {
                return Err(ActionError::Cancelled(format!(
                    "operation cancelled for job {job_id}"
                )));
            }

            let raw = tokio::select! {
                result = transport.status(job_id) => result.map_err(|e| {
                    ActionError::External(format!("status check failed for job {job_id}: {e}"))
                })?,
                _ = cancel.cancelled() => {
                    warn!(%job_id, "cancelled during a status query");
                    return Err(ActionError::Cancelled(format!(
                        "operation cancelled during status check for job {job_id}"
                    )));
                }
            };

            match JobStatusResponse::parse(&raw)?.job_state() {
                JobState::Finished => {
                    info!(%job_id, elapsed = ?started.elapsed(), "job finished");
                    return Ok(raw.to_string());
                }
                JobState::Failed { reason } => {
                    let message = reason.unwrap_or_else(|| format!("job {job_id} failed"));
                    warn!(%job_id, %message, "job failed");
                    return Err(ActionError::External(message));
                }
                JobState::Waiting => debug!(%job_id, "job still in progress"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = cancel.cancelled() => {
                    warn!(%job_id, "cancelled while waiting between status checks");
                    return Err(ActionError::Cancelled(format!(
                        "operation cancelled during status check for job {job_id}"
                    )));
                }
            }
        }

        Err(ActionError::TimedOut(format!(
            "status check timed out after {} for job {job_id}",
            describe_duration(self.config.timeout)
        )))
    }
}

fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{s} seconds"),
    }
}
