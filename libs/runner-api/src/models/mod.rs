//! API models

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Default branch used when the control plane omits one
pub const DEFAULT_BRANCH: &str = "main";

/// Default SSH port used when the control plane omits one
pub const DEFAULT_SSH_PORT: &str = "22";

/// Job status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "running")]
    Claimed,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the status is final
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Claimed => "claimed",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment job handed out by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default = "default_branch", deserialize_with = "branch_or_default")]
    pub branch: String,

    pub project: Project,
}

/// Deployment target configuration embedded in a job
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: u64,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,

    pub repo_url: String,

    #[serde(default)]
    pub framework: Option<String>,

    /// `local` or `cpanel`
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub ssh_host: Option<String>,

    /// Sent as a string by the control plane, numbers are accepted too
    #[serde(default, deserialize_with = "port_as_string")]
    pub ssh_port: Option<String>,

    #[serde(default)]
    pub ssh_user: Option<String>,

    #[serde(default)]
    pub ssh_password: Option<String>,

    #[serde(default)]
    pub ssh_key_path: Option<String>,

    #[serde(default)]
    pub remote_path: Option<String>,

    #[serde(default)]
    pub public_path: Option<String>,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("repo_url", &self.repo_url)
            .field("framework", &self.framework)
            .field("target", &self.target)
            .field("ssh_host", &self.ssh_host)
            .field("ssh_port", &self.ssh_port)
            .field("ssh_user", &self.ssh_user)
            .field("ssh_password", &self.ssh_password.as_ref().map(|_| "[REDACTED]"))
            .field("ssh_key_path", &self.ssh_key_path)
            .field("remote_path", &self.remote_path)
            .field("public_path", &self.public_path)
            .finish()
    }
}

/// Response of `GET /api/runner/jobs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub job: Option<Job>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /api/runner/jobs/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: JobStatus,
    pub logs: String,
}

/// Body of `POST /api/runner/jobs/{id}/logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAppendRequest {
    pub logs: String,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn branch_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let branch = Option::<String>::deserialize(deserializer)?;
    Ok(branch
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(default_branch))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn port_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Port>::deserialize(deserializer)? {
        Some(Port::Text(s)) => Some(s),
        Some(Port::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_response_without_job() {
        let resp: PollResponse =
            serde_json::from_str(r#"{"job": null, "message": "No jobs available"}"#).unwrap();
        assert!(resp.job.is_none());
        assert_eq!(resp.message.as_deref(), Some("No jobs available"));
    }

    #[test]
    fn test_job_from_control_plane_payload() {
        let payload = r#"{
            "job": {
                "id": 42,
                "status": "queued",
                "branch": "release",
                "commit_hash": null,
                "project": {
                    "id": 7,
                    "name": "shop",
                    "repo_url": "https://example.com/shop.git",
                    "framework": "laravel",
                    "target": "cpanel",
                    "ssh_host": "203.0.113.10",
                    "ssh_port": 21098,
                    "ssh_user": "deploy",
                    "ssh_password": "hunter2",
                    "ssh_key_path": null,
                    "remote_path": "/home/deploy/shop",
                    "public_path": "/home/deploy/public_html"
                }
            }
        }"#;

        let resp: PollResponse = serde_json::from_str(payload).unwrap();
        let job = resp.job.unwrap();
        assert_eq!(job.id, 42);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.branch, "release");
        assert_eq!(job.project.ssh_port.as_deref(), Some("21098"));
        assert!(job.project.ssh_key_path.is_none());
    }

    #[test]
    fn test_missing_branch_defaults_to_main() {
        let job: Job = serde_json::from_str(
            r#"{"id": 1, "branch": null, "project": {"repo_url": "r", "name": null}}"#,
        )
        .unwrap();
        assert_eq!(job.branch, DEFAULT_BRANCH);
        assert_eq!(job.project.name, "");
    }

    #[test]
    fn test_project_debug_redacts_password() {
        let project = Project {
            repo_url: "r".to_string(),
            ssh_password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let out = format!("{:?}", project);
        assert!(!out.contains("hunter2"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn test_status_update_serialization() {
        let body = StatusUpdateRequest {
            status: JobStatus::Completed,
            logs: "done".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["logs"], "done");
    }
}
