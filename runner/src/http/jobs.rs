//! Runner job API

use async_trait::async_trait;
use runner_api::{Job, JobStatus, LogAppendRequest, PollResponse, StatusUpdateRequest};

use crate::errors::RunnerError;
use crate::http::client::HttpClient;

/// Control plane operations used by the runner
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch the next claimable job, if any
    async fn poll_job(&self) -> Result<Option<Job>, RunnerError>;

    /// Claim a job for this runner
    async fn claim_job(&self, job_id: u64) -> Result<(), RunnerError>;

    /// Report a job status together with a log payload
    async fn update_job_status(
        &self,
        job_id: u64,
        status: JobStatus,
        logs: &str,
    ) -> Result<(), RunnerError>;

    /// Append a line to the job log
    async fn append_job_logs(&self, job_id: u64, logs: &str) -> Result<(), RunnerError>;

    /// Liveness signal
    async fn send_heartbeat(&self) -> Result<(), RunnerError>;
}

#[async_trait]
impl ControlPlane for HttpClient {
    async fn poll_job(&self) -> Result<Option<Job>, RunnerError> {
        let response: PollResponse = self.get("/api/runner/jobs").await?;
        Ok(response.job)
    }

    async fn claim_job(&self, job_id: u64) -> Result<(), RunnerError> {
        let path = format!("/api/runner/jobs/{}/claim", job_id);
        match self.post_ack(&path, None::<&()>).await {
            Err(RunnerError::ControlPlaneError(body)) => Err(RunnerError::ClaimError(body)),
            other => other,
        }
    }

    async fn update_job_status(
        &self,
        job_id: u64,
        status: JobStatus,
        logs: &str,
    ) -> Result<(), RunnerError> {
        let path = format!("/api/runner/jobs/{}/status", job_id);
        let body = StatusUpdateRequest {
            status,
            logs: logs.to_string(),
        };
        self.post_ack(&path, Some(&body)).await
    }

    async fn append_job_logs(&self, job_id: u64, logs: &str) -> Result<(), RunnerError> {
        let path = format!("/api/runner/jobs/{}/logs", job_id);
        let body = LogAppendRequest {
            logs: logs.to_string(),
        };
        self.post_ack(&path, Some(&body)).await
    }

    async fn send_heartbeat(&self) -> Result<(), RunnerError> {
        self.post_ack("/api/runner/heartbeat", None::<&()>).await
    }
}
