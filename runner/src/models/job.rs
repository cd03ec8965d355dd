//! Job and deployment target models

use std::path::{Component, Path, PathBuf};

use secrecy::SecretString;

use crate::errors::RunnerError;

pub use runner_api::{Job, JobStatus, Project, DEFAULT_SSH_PORT};

/// Target kind that selects the remote git-pull strategy
pub const REMOTE_TARGET: &str = "cpanel";

/// Deployment strategy for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Clone and build inside a local scratch directory
    LocalBuild,

    /// Converge a checkout on a remote host over SSH
    RemoteGitPull,
}

impl Strategy {
    /// Select the strategy for a project: `cpanel` is remote, anything else local
    pub fn select(project: &Project) -> Self {
        match project.target.as_deref() {
            Some(REMOTE_TARGET) => Strategy::RemoteGitPull,
            _ => Strategy::LocalBuild,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::LocalBuild => "local-build",
            Strategy::RemoteGitPull => "remote-git-pull",
        }
    }
}

/// SSH credentials, at least one of password and key path is set
#[derive(Debug, Clone)]
pub struct Credentials {
    pub password: Option<SecretString>,
    pub key_path: Option<PathBuf>,
}

/// Validated remote deployment target
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credentials: Credentials,

    /// Checkout location on the remote host
    pub remote_path: String,

    /// Web root to repoint at the checkout, when distinct from it
    pub public_path: Option<String>,
}

impl RemoteTarget {
    /// Build a remote target from a project, rejecting incomplete configuration
    pub fn from_project(project: &Project) -> Result<Self, RunnerError> {
        let host = required(&project.ssh_host, "ssh_host")?;
        let user = required(&project.ssh_user, "ssh_user")?;
        validate_ssh_field(&host, "ssh_host")?;
        validate_ssh_field(&user, "ssh_user")?;
        if user.contains('@') {
            return Err(RunnerError::ValidationError(format!(
                "Invalid ssh_user '{}': must not contain '@'",
                user.escape_debug()
            )));
        }
        let remote_path = normalize_path(&required(&project.remote_path, "remote_path")?);
        validate_remote_path(&remote_path)?;

        let port_str = non_empty(&project.ssh_port).unwrap_or_else(|| DEFAULT_SSH_PORT.to_string());
        let port = port_str
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| RunnerError::ValidationError(format!("Invalid ssh_port: {}", port_str)))?;

        let credentials = Credentials {
            password: non_empty(&project.ssh_password).map(SecretString::from),
            key_path: non_empty(&project.ssh_key_path).map(PathBuf::from),
        };
        if credentials.password.is_none() && credentials.key_path.is_none() {
            return Err(RunnerError::ValidationError(
                "Remote target requires ssh_password or ssh_key_path".to_string(),
            ));
        }

        let public_path = non_empty(&project.public_path)
            .map(|p| normalize_path(&p))
            .filter(|p| p != &remote_path);
        if let Some(public_path) = &public_path {
            validate_remote_path(public_path)?;
        }

        Ok(Self {
            host,
            port,
            user,
            credentials,
            remote_path,
            public_path,
        })
    }

    /// `user@host:port` for log lines
    pub fn display_addr(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Check a branch name is safe to hand to git as a positional argument
pub fn validate_branch(branch: &str) -> Result<(), RunnerError> {
    let invalid = |reason: &str| {
        Err(RunnerError::ValidationError(format!(
            "Invalid branch name '{}': {}",
            branch.escape_debug(),
            reason
        )))
    };

    if branch.is_empty() {
        return invalid("empty");
    }
    if branch.starts_with('-') {
        return invalid("must not start with '-'");
    }
    if branch.contains("..") {
        return invalid("must not contain '..'");
    }
    if branch.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid("must not contain whitespace or control characters");
    }
    if branch.chars().any(|c| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')) {
        return invalid("contains characters git does not allow in refs");
    }
    Ok(())
}

fn required(value: &Option<String>, field: &str) -> Result<String, RunnerError> {
    non_empty(value).ok_or_else(|| {
        RunnerError::ValidationError(format!("Remote target requires a non-empty {}", field))
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// User and host end up in ssh's destination argument, so neither may look
/// like an option or split into several words
fn validate_ssh_field(value: &str, field: &str) -> Result<(), RunnerError> {
    if value.starts_with('-') || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RunnerError::ValidationError(format!(
            "Invalid {} '{}': must not start with '-' or contain whitespace",
            field,
            value.escape_debug()
        )));
    }
    Ok(())
}

/// Drop trailing slashes and a leading `~/`. Paths are quoted on the remote
/// shell so the tilde would never expand, and ssh sessions already start in
/// the login directory.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.strip_prefix("~/") {
        Some(relative) => {
            let relative = relative.trim_start_matches('/');
            if relative.is_empty() {
                "~".to_string()
            } else {
                relative.to_string()
            }
        }
        None => trimmed.to_string(),
    }
}

/// Remote paths are removed and replaced during deployment, so refuse the
/// filesystem root, the login directory and parent traversal
fn validate_remote_path(path: &str) -> Result<(), RunnerError> {
    let reject = |reason: &str| {
        Err(RunnerError::ValidationError(format!(
            "Unsafe remote path '{}': {}",
            path.escape_debug(),
            reason
        )))
    };

    if path == "/" || path == "~" || path == "." {
        return reject("refers to a root or home directory");
    }
    if path.starts_with('~') {
        return reject("'~user' paths are not supported");
    }
    if path.chars().any(|c| c.is_control()) {
        return reject("contains control characters");
    }
    if Path::new(path).components().any(|c| matches!(c, Component::ParentDir)) {
        return reject("must not contain '..'");
    }
    Ok(())
}
