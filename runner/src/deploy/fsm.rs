//! Finite state machine for a single job

use crate::errors::RunnerError;
use crate::models::job::JobStatus;

/// Job event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// The control plane granted the claim
    Claim,

    /// Every fatal step succeeded
    Complete,

    /// A fatal step failed or the job could not be run
    Fail(String),
}

/// Job FSM
///
/// A job moves `pending -> claimed -> completed | failed` and is reported
/// terminal exactly once.
#[derive(Debug, Clone)]
pub struct JobFsm {
    job_id: u64,
    state: JobStatus,
    error: Option<String>,
}

impl JobFsm {
    /// Create a new FSM in pending state
    pub fn new(job_id: u64) -> Self {
        Self {
            job_id,
            state: JobStatus::Pending,
            error: None,
        }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Get current state
    pub fn state(&self) -> JobStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: JobEvent) -> Result<JobStatus, RunnerError> {
        let new_state = match (self.state, &event) {
            (JobStatus::Pending, JobEvent::Claim) => JobStatus::Claimed,
            (JobStatus::Claimed, JobEvent::Complete) => JobStatus::Completed,
            (JobStatus::Claimed, JobEvent::Fail(err)) => {
                self.error = Some(err.clone());
                JobStatus::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(RunnerError::StateError(format!(
                    "job #{}: {} -> {:?}",
                    self.job_id, state, event
                )));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}
