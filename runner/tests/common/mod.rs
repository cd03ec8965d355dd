//! Recording fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use deployr_runner::deploy::command::{CommandOutput, ShellCommand};
use deployr_runner::deploy::executor::{CommandExecutor, RemoteConnector, RemoteSession};
use deployr_runner::errors::RunnerError;
use deployr_runner::http::jobs::ControlPlane;
use deployr_runner::models::job::{Job, JobStatus, Project, RemoteTarget};
use deployr_runner::storage::layout::StorageLayout;
use deployr_runner::workers::deployer::{DeployContext, JobController};

pub const REPO_URL: &str = "https://example.com/acme/shop.git";
pub const REMOTE_PATH: &str = "/home/deploy/shop";
pub const PUBLIC_PATH: &str = "/home/deploy/public_html";

// ================================ CONTROL PLANE ================================== //

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Poll,
    Claim(u64),
    Status(u64, JobStatus, String),
    Log(u64, String),
    Heartbeat,
}

#[derive(Default)]
pub struct FakeControlPlane {
    calls: Mutex<Vec<Call>>,
    jobs: Mutex<VecDeque<Job>>,
    pub fail_claim: bool,
    pub fail_poll: bool,
    pub fail_logs: bool,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_job(&self, job: Job) {
        self.jobs.lock().unwrap().push_back(job);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(u64, JobStatus, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Status(id, status, logs) => Some((id, status, logs)),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Log(_, line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn heartbeats(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Heartbeat).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn poll_job(&self) -> Result<Option<Job>, RunnerError> {
        self.record(Call::Poll);
        if self.fail_poll {
            return Err(RunnerError::ControlPlaneError("503 Service Unavailable: down".to_string()));
        }
        Ok(self.jobs.lock().unwrap().pop_front())
    }

    async fn claim_job(&self, job_id: u64) -> Result<(), RunnerError> {
        self.record(Call::Claim(job_id));
        if self.fail_claim {
            return Err(RunnerError::ClaimError("409 Conflict: Job already claimed".to_string()));
        }
        Ok(())
    }

    async fn update_job_status(&self, job_id: u64, status: JobStatus, logs: &str) -> Result<(), RunnerError> {
        self.record(Call::Status(job_id, status, logs.to_string()));
        Ok(())
    }

    async fn append_job_logs(&self, job_id: u64, logs: &str) -> Result<(), RunnerError> {
        self.record(Call::Log(job_id, logs.to_string()));
        if self.fail_logs {
            return Err(RunnerError::ControlPlaneError("500 Internal Server Error: ".to_string()));
        }
        Ok(())
    }

    async fn send_heartbeat(&self) -> Result<(), RunnerError> {
        self.record(Call::Heartbeat);
        Ok(())
    }
}

// ================================== EXECUTORS ==================================== //

type Handler = dyn Fn(&ShellCommand) -> Result<CommandOutput, RunnerError> + Send + Sync;

/// Records every command and answers with a scripted handler
pub struct ScriptedExecutor {
    handler: Box<Handler>,
    commands: Mutex<Vec<ShellCommand>>,
}

impl ScriptedExecutor {
    pub fn new<H>(handler: H) -> Arc<Self>
    where
        H: Fn(&ShellCommand) -> Result<CommandOutput, RunnerError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            commands: Mutex::new(Vec::new()),
        })
    }

    /// Every command succeeds with no output
    pub fn succeeding() -> Arc<Self> {
        Self::new(|_| ok(""))
    }

    pub fn commands(&self) -> Vec<ShellCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands as the remote shell would see them
    pub fn rendered(&self) -> Vec<String> {
        self.commands().iter().map(|c| c.to_shell_line()).collect()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.rendered().iter().position(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError> {
        self.commands.lock().unwrap().push(command.clone());
        (self.handler)(command)
    }

    fn context(&self) -> String {
        "scripted".to_string()
    }
}

pub fn ok(output: &str) -> Result<CommandOutput, RunnerError> {
    Ok(CommandOutput {
        output: output.to_string(),
        success: true,
        exit_code: Some(0),
    })
}

pub fn exit(code: i32, output: &str) -> Result<CommandOutput, RunnerError> {
    Ok(CommandOutput {
        output: output.to_string(),
        success: code == 0,
        exit_code: Some(code),
    })
}

/// Whether a command is `<program> <first arg> ...`
pub fn is(command: &ShellCommand, program: &str, first_arg: &str) -> bool {
    command.program == program && command.args.first().map(String::as_str) == Some(first_arg)
}

/// Remote host behavior: checkout probe and public path probe answers
pub fn remote_host(checkout_present: bool, public_state: &'static str) -> Arc<ScriptedExecutor> {
    ScriptedExecutor::new(move |cmd| {
        if cmd.program == "test" {
            return exit(if checkout_present { 0 } else { 1 }, "");
        }
        if cmd.program == "sh" {
            return ok(public_state);
        }
        ok("")
    })
}

// ================================== CONNECTOR ==================================== //

pub struct FakeConnector {
    host: Arc<ScriptedExecutor>,
    pub fail_with: Option<String>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(host: Arc<ScriptedExecutor>) -> Self {
        Self {
            host,
            fail_with: None,
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(&self, _target: &RemoteTarget) -> Result<Box<dyn RemoteSession>, RunnerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail_with {
            return Err(RunnerError::SshError(format!("Failed to connect via SSH: {}", reason)));
        }
        Ok(Box::new(FakeSession {
            host: self.host.clone(),
            closes: self.closes.clone(),
        }))
    }
}

struct FakeSession {
    host: Arc<ScriptedExecutor>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl CommandExecutor for FakeSession {
    async fn execute(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError> {
        self.host.execute(command).await
    }

    fn context(&self) -> String {
        "fake-ssh".to_string()
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn close(&self) -> Result<(), RunnerError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =================================== FIXTURES ==================================== //

pub fn remote_job(id: u64, branch: &str) -> Job {
    Job {
        id,
        status: JobStatus::Pending,
        branch: branch.to_string(),
        project: Project {
            id: 1,
            name: "shop".to_string(),
            repo_url: REPO_URL.to_string(),
            framework: Some("laravel".to_string()),
            target: Some("cpanel".to_string()),
            ssh_host: Some("203.0.113.10".to_string()),
            ssh_port: Some("21098".to_string()),
            ssh_user: Some("deploy".to_string()),
            ssh_password: Some("hunter2".to_string()),
            remote_path: Some(REMOTE_PATH.to_string()),
            public_path: Some(PUBLIC_PATH.to_string()),
            ..Default::default()
        },
    }
}

pub fn local_job(id: u64) -> Job {
    Job {
        id,
        status: JobStatus::Pending,
        branch: "main".to_string(),
        project: Project {
            id: 2,
            name: "site".to_string(),
            repo_url: REPO_URL.to_string(),
            target: Some("local".to_string()),
            ..Default::default()
        },
    }
}

/// Local executor whose `git clone` materializes a checkout with `files`
pub fn cloning_executor(files: &'static [(&'static str, &'static str)]) -> Arc<ScriptedExecutor> {
    ScriptedExecutor::new(move |cmd| {
        materialize_clone(cmd, files);
        ok("")
    })
}

/// Write `files` into the clone target when `cmd` is a `git clone`
pub fn materialize_clone(cmd: &ShellCommand, files: &[(&str, &str)]) {
    if is(cmd, "git", "clone") {
        let cwd = cmd.cwd.clone().unwrap_or_default();
        let target = cmd.args.last().cloned().unwrap_or_default();
        let dir = Path::new(&cwd).join(target);
        std::fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            std::fs::write(dir.join(name), content).unwrap();
        }
    }
}

pub struct Harness {
    pub control_plane: Arc<FakeControlPlane>,
    pub local: Arc<ScriptedExecutor>,
    pub connector: Arc<FakeConnector>,
    pub layout: StorageLayout,
}

impl Harness {
    pub fn new(
        control_plane: FakeControlPlane,
        local: Arc<ScriptedExecutor>,
        connector: FakeConnector,
        layout: StorageLayout,
    ) -> Self {
        Self {
            control_plane: Arc::new(control_plane),
            local,
            connector: Arc::new(connector),
            layout,
        }
    }

    pub fn controller(&self) -> JobController {
        JobController::new(DeployContext {
            control_plane: self.control_plane.clone(),
            local_executor: self.local.clone(),
            connector: self.connector.clone(),
            layout: self.layout.clone(),
            composer_bin: "/opt/cpanel/composer/bin/composer".to_string(),
        })
    }
}
