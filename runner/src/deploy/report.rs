//! Job log reporting

use std::sync::Arc;

use tracing::{info, warn};

use crate::http::jobs::ControlPlane;

/// Best-effort log stream for one job.
///
/// Every line is mirrored to the local log; failures to reach the control
/// plane are logged and otherwise ignored.
#[derive(Clone)]
pub struct JobReporter {
    control_plane: Arc<dyn ControlPlane>,
    job_id: u64,
}

impl JobReporter {
    pub fn new(control_plane: Arc<dyn ControlPlane>, job_id: u64) -> Self {
        Self {
            control_plane,
            job_id,
        }
    }

    /// Append a line to the job log
    pub async fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(job_id = self.job_id, "{}", message);

        if let Err(e) = self.control_plane.append_job_logs(self.job_id, &message).await {
            warn!("Failed to append logs for job #{}: {}", self.job_id, e);
        }
    }
}
