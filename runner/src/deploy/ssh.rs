//! SSH sessions over the system `ssh` client
//!
//! One master connection is opened per job with OpenSSH connection
//! multiplexing. Every command is a separate session over the master's control
//! socket, so authentication happens once. Passwords go through `sshpass -e`
//! and are only ever placed in the child's environment.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::command::{CommandOutput, ShellCommand};
use crate::deploy::executor::{CommandExecutor, RemoteConnector, RemoteSession};
use crate::errors::RunnerError;
use crate::models::job::RemoteTarget;

/// TCP connect timeout handed to ssh
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time the master handshake may take on top of the connect timeout
const HANDSHAKE_GRACE: Duration = Duration::from_secs(30);

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle lifetime of the master once the last session ends
const CONTROL_PERSIST_SECS: u64 = 300;

/// ssh reserves this exit code for its own errors
const SSH_ERROR_EXIT: i32 = 255;

/// Opens [`SshSession`]s
#[derive(Debug, Clone)]
pub struct SshConnector {
    command_timeout: Duration,
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            command_timeout,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>, RunnerError> {
        let session = SshSession::connect(target, self.command_timeout, self.connect_timeout).await?;
        Ok(Box::new(session))
    }
}

/// A multiplexed SSH connection to one host
#[derive(Debug)]
pub struct SshSession {
    destination: String,
    port: u16,
    control_dir: PathBuf,
    command_timeout: Duration,
    closed: AtomicBool,
}

impl SshSession {
    /// Establish the master connection
    pub async fn connect(
        target: &RemoteTarget,
        command_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, RunnerError> {
        let identity = resolve_identity(target).await?;
        let control_dir = create_control_dir().await?;

        let session = Self {
            destination: format!("{}@{}", target.user, target.host),
            port: target.port,
            control_dir,
            command_timeout,
            closed: AtomicBool::new(false),
        };

        info!("Connecting to {} via SSH...", target.display_addr());

        let password = target.credentials.password.as_ref();
        let mut cmd = match password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.args(["-e", "ssh"]).env("SSHPASS", password.expose_secret());
                cmd
            }
            None => Command::new("ssh"),
        };

        cmd.args(["-o", "ControlMaster=yes"])
            .arg("-o")
            .arg(format!("ControlPersist={}", CONTROL_PERSIST_SECS))
            .arg("-E")
            .arg(session.master_log())
            .args(session.common_args(connect_timeout))
            .args(["-o", if password.is_some() { "BatchMode=no" } else { "BatchMode=yes" }]);
        if let Some(identity) = &identity {
            cmd.arg("-i").arg(identity).args(["-o", "IdentitiesOnly=yes"]);
        }
        cmd.args(session.destination_args())
            .arg("true")
            // the backgrounded master must not hold our pipes open
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let status = match tokio::time::timeout(connect_timeout + HANDSHAKE_GRACE, cmd.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let program = if password.is_some() { "sshpass" } else { "ssh" };
                session.discard().await;
                return Err(RunnerError::SshError(format!(
                    "Failed to connect via SSH: cannot run {}: {}",
                    program, e
                )));
            }
            Err(_) => {
                session.discard().await;
                return Err(RunnerError::SshError(format!(
                    "Failed to connect via SSH: timed out after {}s",
                    (connect_timeout + HANDSHAKE_GRACE).as_secs()
                )));
            }
        };

        if !status.success() {
            let detail = match (password.is_some(), status.code()) {
                (true, Some(5)) => "invalid password".to_string(),
                (true, Some(6)) => "host key verification failed".to_string(),
                _ => session.read_master_log().await,
            };
            session.discard().await;
            return Err(RunnerError::SshError(format!("Failed to connect via SSH: {}", detail)));
        }

        info!("Connected to {}", target.display_addr());
        Ok(session)
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.join("ctl")
    }

    fn master_log(&self) -> PathBuf {
        self.control_dir.join("master.log")
    }

    /// Destination after `--` so ssh never parses it as an option
    fn destination_args(&self) -> [&str; 2] {
        ["--", self.destination.as_str()]
    }

    fn common_args(&self, connect_timeout: Duration) -> Vec<String> {
        vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path().display()),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_timeout.as_secs()),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]
    }

    async fn read_master_log(&self) -> String {
        tokio::fs::read_to_string(self.master_log())
            .await
            .ok()
            .map(|log| log.trim().to_string())
            .filter(|log| !log.is_empty())
            .unwrap_or_else(|| "ssh exited without output".to_string())
    }

    async fn discard(&self) {
        self.closed.store(true, Ordering::SeqCst);
        remove_control_dir(&self.control_dir).await;
    }
}

#[async_trait]
impl CommandExecutor for SshSession {
    async fn execute(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RunnerError::SshError("Session is closed".to_string()));
        }

        let line = command.to_shell_line();
        debug!("Executing on {}: {}", self.destination, line);

        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "ControlMaster=no", "-o", "BatchMode=yes"])
            .args(self.common_args(CONNECT_TIMEOUT))
            .args(self.destination_args())
            .arg(&line)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| RunnerError::SshError(format!("Failed to run ssh: {}", e)))?,
            Err(_) => {
                return Err(RunnerError::CommandTimeout(
                    self.command_timeout.as_secs(),
                    command.to_string(),
                ))
            }
        };

        if output.status.code() == Some(SSH_ERROR_EXIT) {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RunnerError::SshError(stderr));
        }

        Ok(CommandOutput::from_parts(
            &output.stdout,
            &output.stderr,
            output.status.success(),
            output.status.code(),
        ))
    }

    fn context(&self) -> String {
        format!("ssh {}:{}", self.destination, self.port)
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn close(&self) -> Result<(), RunnerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut cmd = Command::new("ssh");
        cmd.arg("-O")
            .arg("exit")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path().display()))
            .args(self.destination_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(CLOSE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) if status.success() => debug!("Closed SSH master for {}", self.destination),
            Ok(Ok(status)) => warn!("ssh -O exit for {} returned {}", self.destination, status),
            Ok(Err(e)) => warn!("Failed to stop SSH master for {}: {}", self.destination, e),
            Err(_) => warn!("Timed out stopping SSH master for {}", self.destination),
        }

        remove_control_dir(&self.control_dir).await;
        info!("Disconnected from {}", self.destination);
        Ok(())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            // the master exits on its own after ControlPersist once the socket is gone
            if let Err(e) = std::fs::remove_dir_all(&self.control_dir) {
                warn!("Failed to remove {:?}: {}", self.control_dir, e);
            }
        }
    }
}

/// Key file to pass with `-i`, if any. A missing key is only tolerated when a
/// password can be used instead.
async fn resolve_identity(target: &RemoteTarget) -> Result<Option<PathBuf>, RunnerError> {
    let Some(key_path) = &target.credentials.key_path else {
        return Ok(None);
    };

    if tokio::fs::metadata(key_path).await.is_ok() {
        return Ok(Some(key_path.clone()));
    }

    if target.credentials.password.is_some() {
        warn!("SSH key {:?} not found, falling back to password", key_path);
        Ok(None)
    } else {
        Err(RunnerError::SshError(format!(
            "Failed to connect via SSH: key file {:?} not found",
            key_path
        )))
    }
}

async fn create_control_dir() -> Result<PathBuf, RunnerError> {
    let dir = std::env::temp_dir().join(format!("deployr-ssh-{}", uuid::Uuid::new_v4().simple()));

    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(&dir).await?;

    Ok(dir)
}

async fn remove_control_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", dir, e);
        }
    }
}
