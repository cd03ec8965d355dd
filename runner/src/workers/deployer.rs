//! Job lifecycle controller
//!
//! Claims a job, runs the selected pipeline and reports exactly one terminal
//! status. The pipeline runs in its own task so that even a panic ends in a
//! `failed` report.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::executor::{CommandExecutor, RemoteConnector};
use crate::deploy::fsm::{JobEvent, JobFsm};
use crate::deploy::local::LocalBuild;
use crate::deploy::remote::RemoteGitPull;
use crate::deploy::report::JobReporter;
use crate::errors::RunnerError;
use crate::http::jobs::ControlPlane;
use crate::models::job::{validate_branch, Job, JobStatus, RemoteTarget, Strategy};
use crate::storage::layout::StorageLayout;

/// Everything a job needs, passed explicitly instead of through globals
#[derive(Clone)]
pub struct DeployContext {
    pub control_plane: Arc<dyn ControlPlane>,
    pub local_executor: Arc<dyn CommandExecutor>,
    pub connector: Arc<dyn RemoteConnector>,
    pub layout: StorageLayout,
    pub composer_bin: String,
}

/// Drives one job at a time through claim, pipeline and terminal report
#[derive(Clone)]
pub struct JobController {
    ctx: DeployContext,
}

impl JobController {
    pub fn new(ctx: DeployContext) -> Self {
        Self { ctx }
    }

    /// Process a job end to end.
    ///
    /// Returns the terminal status that was reported. A claim failure is
    /// returned as an error without any status report.
    pub async fn process(&self, job: Job) -> Result<JobStatus, RunnerError> {
        let strategy = Strategy::select(&job.project);
        info!(
            "Processing job #{} for project {} (target: {})",
            job.id,
            job.project.name,
            job.project.target.as_deref().unwrap_or("local")
        );

        let mut fsm = JobFsm::new(job.id);
        self.ctx.control_plane.claim_job(job.id).await?;
        fsm.process(JobEvent::Claim)?;

        let reporter = JobReporter::new(self.ctx.control_plane.clone(), job.id);

        let ctx = self.ctx.clone();
        let task_reporter = reporter.clone();
        let handle = tokio::spawn(async move { execute(&ctx, &job, strategy, &task_reporter).await });

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(RunnerError::Internal(format!("deployment task aborted: {}", e))),
        };

        let event = match result {
            Ok(()) => {
                info!("Job #{} completed successfully", fsm.job_id());
                JobEvent::Complete
            }
            Err(e) => {
                let message = format!("{}: {}", failure_prefix(strategy), e);
                error!("Job #{} failed: {}", fsm.job_id(), message);
                JobEvent::Fail(message)
            }
        };

        let status = fsm.process(event)?;
        let message = fsm.error().unwrap_or(success_message(strategy));
        if let Err(e) = self
            .ctx
            .control_plane
            .update_job_status(fsm.job_id(), status, message)
            .await
        {
            error!("Failed to report status {} for job #{}: {}", status, fsm.job_id(), e);
        }

        Ok(status)
    }
}

async fn execute(
    ctx: &DeployContext,
    job: &Job,
    strategy: Strategy,
    reporter: &JobReporter,
) -> Result<(), RunnerError> {
    match strategy {
        Strategy::RemoteGitPull => deploy_remote(ctx, job, reporter).await,
        Strategy::LocalBuild => deploy_local(ctx, job, reporter).await,
    }
}

async fn deploy_remote(ctx: &DeployContext, job: &Job, reporter: &JobReporter) -> Result<(), RunnerError> {
    reporter.log("[Runner] Starting SSH deployment to cPanel...").await;

    let target = RemoteTarget::from_project(&job.project)?;
    validate_branch(&job.branch)?;

    let session = ctx.connector.connect(&target).await?;
    reporter
        .log(format!("[Runner] Connected to {}", target.display_addr()))
        .await;

    let pipeline = RemoteGitPull {
        repo_url: &job.project.repo_url,
        branch: &job.branch,
        target: &target,
        composer_bin: &ctx.composer_bin,
    };
    let result = pipeline.run(session.as_ref(), reporter).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close SSH session for job #{}: {}", job.id, e);
    }

    result
}

async fn deploy_local(ctx: &DeployContext, job: &Job, reporter: &JobReporter) -> Result<(), RunnerError> {
    validate_branch(&job.branch)?;
    reporter
        .log(format!("[Runner] Cloning repository: {}", job.project.repo_url))
        .await;

    let build = LocalBuild {
        job_id: job.id,
        repo_url: &job.project.repo_url,
        branch: &job.branch,
        layout: &ctx.layout,
    };
    build.run(ctx.local_executor.as_ref(), reporter).await?;
    Ok(())
}

fn success_message(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::RemoteGitPull => "[Runner] SSH Deployment completed successfully! ✅",
        Strategy::LocalBuild => "[Runner] Deployment completed successfully! ✅",
    }
}

fn failure_prefix(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::RemoteGitPull => "SSH deployment failed",
        Strategy::LocalBuild => "Deployment failed",
    }
}
