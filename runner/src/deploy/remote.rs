//! Remote git-pull pipeline
//!
//! Converges a checkout on a remote host: clone when absent, pull when
//! present, then refresh dependencies and caches and repoint the web root.
//! Only the sync is fatal, everything after it is best-effort.

use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use crate::deploy::command::ShellCommand;
use crate::deploy::cutover::{plan_cutover, probe_command, PublicPathState};
use crate::deploy::executor::CommandExecutor;
use crate::deploy::report::JobReporter;
use crate::deploy::step::{run_steps, DeploymentStep};
use crate::errors::RunnerError;
use crate::models::job::RemoteTarget;

/// Whether the remote path already holds a git checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Present,
    Absent,
}

/// One remote deployment
#[derive(Debug, Clone)]
pub struct RemoteGitPull<'a> {
    pub repo_url: &'a str,
    pub branch: &'a str,
    pub target: &'a RemoteTarget,
    pub composer_bin: &'a str,
}

impl RemoteGitPull<'_> {
    /// Run the whole pipeline, returning the first fatal error
    pub async fn run<E>(&self, executor: &E, reporter: &JobReporter) -> Result<(), RunnerError>
    where
        E: CommandExecutor + ?Sized,
    {
        info!(
            "Deploying {} ({}) to {}:{}",
            self.repo_url,
            self.branch,
            self.target.display_addr(),
            self.target.remote_path
        );

        run_steps(executor, &self.prepare_steps(), reporter).await?;

        let state = self.sync_decision(executor, reporter).await?;
        run_steps(executor, &self.sync_steps(state), reporter).await?;

        run_steps(executor, &self.post_sync_steps(), reporter).await?;

        if let Some(public_path) = &self.target.public_path {
            self.cutover(executor, public_path, reporter).await;
        }

        Ok(())
    }

    fn prepare_steps(&self) -> Vec<DeploymentStep> {
        match Path::new(&self.target.remote_path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => vec![DeploymentStep::best_effort(
                "Prepare parent directory",
                ShellCommand::new("mkdir").args(["-p", "--", &*parent.to_string_lossy()]),
            )],
            _ => Vec::new(),
        }
    }

    /// Probe for `<remote_path>/.git`: exit 0 is present, exit 1 absent,
    /// anything else is a fatal sync error
    pub async fn sync_decision<E>(
        &self,
        executor: &E,
        reporter: &JobReporter,
    ) -> Result<CheckoutState, RunnerError>
    where
        E: CommandExecutor + ?Sized,
    {
        let git_dir = format!("{}/.git", self.target.remote_path);
        let probe = ShellCommand::new("test").args(["-d", git_dir.as_str()]);

        let output = executor.execute(&probe).await.map_err(|e| {
            RunnerError::SyncError(format!("Failed to check for an existing checkout: {}", e))
        })?;

        let state = match output.exit_code {
            Some(0) => CheckoutState::Present,
            Some(1) => CheckoutState::Absent,
            code => {
                return Err(RunnerError::SyncError(format!(
                    "Checkout probe exited with {:?}: {}",
                    code,
                    output.output.trim()
                )))
            }
        };

        let message = match state {
            CheckoutState::Present => "[Runner] Existing checkout found, pulling latest changes",
            CheckoutState::Absent => "[Runner] No checkout found, cloning repository",
        };
        reporter.log(message).await;

        Ok(state)
    }

    pub fn sync_steps(&self, state: CheckoutState) -> Vec<DeploymentStep> {
        let path = self.target.remote_path.as_str();

        match state {
            CheckoutState::Absent => vec![
                DeploymentStep::fatal(
                    "Clear remote path",
                    ShellCommand::new("rm").args(["-rf", "--", path]),
                )
                .with_error(RunnerError::SyncError),
                DeploymentStep::fatal(
                    "Clone repository",
                    ShellCommand::new("git").args([
                        "clone",
                        "--branch",
                        self.branch,
                        "--depth",
                        "1",
                        "--",
                        self.repo_url,
                        path,
                    ]),
                )
                .with_error(RunnerError::CloneError),
            ],
            CheckoutState::Present => vec![DeploymentStep::fatal(
                "Pull latest changes",
                ShellCommand::new("git")
                    .args(["pull", "origin", self.branch])
                    .current_dir(path),
            )
            .with_error(RunnerError::SyncError)],
        }
    }

    pub fn post_sync_steps(&self) -> Vec<DeploymentStep> {
        let path = self.target.remote_path.as_str();
        let in_checkout = |cmd: ShellCommand| cmd.current_dir(path);

        vec![
            DeploymentStep::best_effort(
                "Install dependencies",
                in_checkout(ShellCommand::new(self.composer_bin).args([
                    "install",
                    "--no-dev",
                    "--optimize-autoloader",
                    "--no-interaction",
                ])),
            ),
            DeploymentStep::best_effort(
                "Run migrations",
                in_checkout(ShellCommand::new("php").args(["artisan", "migrate", "--force"])),
            ),
            DeploymentStep::best_effort(
                "Cache config",
                in_checkout(ShellCommand::new("php").args(["artisan", "config:cache"])),
            ),
            DeploymentStep::best_effort(
                "Cache routes",
                in_checkout(ShellCommand::new("php").args(["artisan", "route:cache"])),
            ),
            DeploymentStep::best_effort(
                "Cache views",
                in_checkout(ShellCommand::new("php").args(["artisan", "view:cache"])),
            ),
            DeploymentStep::best_effort(
                "Fix permissions",
                in_checkout(ShellCommand::new("chmod").args(["-R", "755", "storage", "bootstrap/cache"])),
            ),
        ]
    }

    /// Repoint the public path, never failing the job
    async fn cutover<E>(&self, executor: &E, public_path: &str, reporter: &JobReporter)
    where
        E: CommandExecutor + ?Sized,
    {
        let state = match executor.execute(&probe_command(public_path)).await {
            Ok(out) if out.success => PublicPathState::from_probe(&out.output),
            Ok(out) => {
                warn!("Public path probe failed: {}", out.output.trim());
                None
            }
            Err(e) => {
                warn!("Public path probe failed: {}", e);
                None
            }
        };

        let Some(state) = state else {
            reporter
                .log(format!(
                    "[Runner] ⚠️ Could not inspect {}, skipping public path update",
                    public_path
                ))
                .await;
            return;
        };

        info!("Public path {} is {:?}", public_path, state);
        let steps = plan_cutover(state, public_path, &self.target.remote_path, Utc::now());
        if let Err(e) = run_steps(executor, &steps, reporter).await {
            warn!("Public path update failed: {}", e);
            reporter
                .log(format!("[Runner] ⚠️ Public path update failed (continuing): {}", e))
                .await;
        }
    }
}
