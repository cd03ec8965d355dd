//! Command executors

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::deploy::command::{CommandOutput, ShellCommand};
use crate::errors::RunnerError;
use crate::models::job::RemoteTarget;

/// Runs commands in a bound context (local process or remote session).
///
/// `Err` means the command could not be run at all (spawn failure, timeout,
/// broken connection). A command that ran and exited non-zero is an `Ok`
/// output with `success == false`.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command to completion
    async fn execute(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError>;

    /// Short description of the execution context for log lines
    fn context(&self) -> String;
}

/// An open connection to a remote host. Commands run as separate sessions
/// over the same connection.
#[async_trait]
pub trait RemoteSession: CommandExecutor {
    /// Tear down the connection. Calling it twice is a no-op.
    async fn close(&self) -> Result<(), RunnerError>;
}

/// Opens remote sessions, one per job
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>, RunnerError>;
}

/// Executes commands as local child processes, without a shell
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError> {
        debug!("Executing locally: {} (cwd: {:?})", command, command.cwd);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            // git must fail instead of waiting for credentials on a TTY
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                RunnerError::CommandFailed(format!("Failed to run {}: {}", command.program, e))
            })?,
            Err(_) => {
                return Err(RunnerError::CommandTimeout(
                    self.timeout.as_secs(),
                    command.to_string(),
                ))
            }
        };

        Ok(CommandOutput::from_parts(
            &output.stdout,
            &output.stderr,
            output.status.success(),
            output.status.code(),
        ))
    }

    fn context(&self) -> String {
        "local".to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new(Duration::from_secs(10));
        let cmd = ShellCommand::new("pwd").current_dir(tmp.path().to_string_lossy());

        let out = executor.execute(&cmd).await.unwrap();
        assert!(out.success);
        let expected = tmp.path().canonicalize().unwrap();
        assert_eq!(
            std::path::PathBuf::from(out.output.trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_captures_failure_and_stderr() {
        let executor = LocalExecutor::new(Duration::from_secs(10));
        let cmd = ShellCommand::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);

        let out = executor.execute(&cmd).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, Some(3));
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let executor = LocalExecutor::new(Duration::from_secs(10));
        let cmd = ShellCommand::new("definitely-not-a-real-binary-deployr");
        assert!(matches!(
            executor.execute(&cmd).await,
            Err(RunnerError::CommandFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let executor = LocalExecutor::new(Duration::from_millis(100));
        let cmd = ShellCommand::new("sleep").arg("5");
        assert!(matches!(
            executor.execute(&cmd).await,
            Err(RunnerError::CommandTimeout(_, _))
        ));
    }
}
