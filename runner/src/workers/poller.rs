//! Polling worker: poll, process, heartbeat

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::http::jobs::ControlPlane;
use crate::utils::{calc_exp_backoff, CooldownOptions};
use crate::workers::deployer::JobController;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Extra delay after consecutive poll failures
    pub backoff: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            backoff: CooldownOptions {
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(120),
                multiplier: 2.0,
            },
        }
    }
}

/// Outcome of a single poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// No job was waiting
    Idle,

    /// A job was taken through the controller (or its claim failed)
    Processed,

    /// The control plane could not be polled
    PollFailed,
}

/// Run one poll cycle. Shutdown is never observed mid-job.
pub async fn poll_once(control_plane: &dyn ControlPlane, controller: &JobController) -> Cycle {
    debug!("Polling for jobs...");

    let cycle = match control_plane.poll_job().await {
        Ok(Some(job)) => {
            let job_id = job.id;
            match controller.process(job).await {
                Ok(status) => info!("Job #{} finished with status {}", job_id, status),
                Err(e) if e.is_transport() => warn!("Skipped job #{}: {}", job_id, e),
                Err(e) => error!("Failed to process job #{}: {}", job_id, e),
            }
            Cycle::Processed
        }
        Ok(None) => Cycle::Idle,
        Err(e) => {
            error!("Failed to poll for jobs: {}", e);
            Cycle::PollFailed
        }
    };

    if let Err(e) = control_plane.send_heartbeat().await {
        warn!("Heartbeat failed: {}", e);
    }

    cycle
}

/// Run the poller worker until the shutdown signal resolves
pub async fn run<S, F>(
    options: &Options,
    control_plane: Arc<dyn ControlPlane>,
    controller: JobController,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");

    if let Err(e) = control_plane.send_heartbeat().await {
        warn!("Initial heartbeat failed: {}", e);
    }

    let mut failures: u32 = 0;
    loop {
        let wait = if failures == 0 {
            options.interval
        } else {
            options.interval + calc_exp_backoff(&options.backoff, failures - 1)
        };

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }

        match poll_once(control_plane.as_ref(), &controller).await {
            Cycle::PollFailed => failures = failures.saturating_add(1),
            Cycle::Idle | Cycle::Processed => failures = 0,
        }
    }
}
