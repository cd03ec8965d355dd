//! Local build pipeline

use tracing::{info, warn};

use crate::deploy::command::ShellCommand;
use crate::deploy::executor::CommandExecutor;
use crate::deploy::framework::Framework;
use crate::deploy::report::JobReporter;
use crate::deploy::step::{run_steps, DeploymentStep};
use crate::errors::RunnerError;
use crate::filesys::dir::Dir;
use crate::storage::layout::StorageLayout;

/// One local build inside a per-job scratch directory
#[derive(Debug, Clone)]
pub struct LocalBuild<'a> {
    pub job_id: u64,
    pub repo_url: &'a str,
    pub branch: &'a str,
    pub layout: &'a StorageLayout,
}

impl LocalBuild<'_> {
    /// Clone, detect and build. The scratch directory is removed on every
    /// exit path.
    pub async fn run<E>(&self, executor: &E, reporter: &JobReporter) -> Result<Framework, RunnerError>
    where
        E: CommandExecutor + ?Sized,
    {
        self.layout.setup().await?;

        let job_dir = self.layout.job_dir(self.job_id);
        if job_dir.exists().await {
            info!("Removing stale scratch directory {:?}", job_dir.path());
            job_dir.delete().await?;
        }

        let result = self.build(executor, &job_dir, reporter).await;

        if let Err(e) = job_dir.delete().await {
            warn!("Failed to clean up {:?}: {}", job_dir.path(), e);
        }

        result
    }

    async fn build<E>(&self, executor: &E, job_dir: &Dir, reporter: &JobReporter) -> Result<Framework, RunnerError>
    where
        E: CommandExecutor + ?Sized,
    {
        run_steps(executor, &[self.clone_step()], reporter).await?;

        let framework = Framework::detect(job_dir).await?;
        reporter
            .log(format!("[Runner] Detected framework: {}", framework))
            .await;

        let steps: Vec<DeploymentStep> = framework
            .build_commands(&job_dir.path().to_string_lossy())
            .into_iter()
            .map(|cmd| DeploymentStep::fatal(cmd.to_string(), cmd))
            .collect();
        run_steps(executor, &steps, reporter).await?;

        Ok(framework)
    }

    /// Shallow clone into `job-<id>`, run from the work directory
    pub fn clone_step(&self) -> DeploymentStep {
        let target = format!("job-{}", self.job_id);

        DeploymentStep::fatal(
            "Clone repository",
            ShellCommand::new("git")
                .args([
                    "clone",
                    "--branch",
                    self.branch,
                    "--depth",
                    "1",
                    "--",
                    self.repo_url,
                    target.as_str(),
                ])
                .current_dir(self.layout.work_dir.to_string_lossy()),
        )
        .with_error(RunnerError::CloneError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_step() {
        let layout = StorageLayout::new("/var/lib/deployr");
        let build = LocalBuild {
            job_id: 42,
            repo_url: "git@example.com:acme/site.git",
            branch: "main",
            layout: &layout,
        };

        let step = build.clone_step();
        assert_eq!(
            step.command.to_shell_line(),
            "cd -- '/var/lib/deployr' && git clone --branch main --depth 1 -- git@example.com:acme/site.git job-42"
        );
        assert!(matches!((step.error)("x".to_string()), RunnerError::CloneError(_)));
    }
}
