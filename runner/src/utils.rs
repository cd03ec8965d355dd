//! Utility functions

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Version information for the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt.min(64) as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Host report printed by `--diagnostic`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub version: VersionInfo,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub kernel: Option<String>,
    pub cpus: usize,
    pub total_memory_mb: u64,
    pub tools: Vec<ToolStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: Option<String>,
}

/// External programs the runner shells out to
pub const REQUIRED_TOOLS: &[&str] = &["git", "ssh", "sshpass"];

/// Collect host information and check the required tools are installed
pub fn run_diagnostic() -> Diagnostic {
    let sys = System::new_all();

    Diagnostic {
        version: version_info(),
        hostname: System::host_name(),
        os: System::long_os_version(),
        kernel: System::kernel_version(),
        cpus: sys.cpus().len(),
        total_memory_mb: sys.total_memory() / 1024 / 1024,
        tools: REQUIRED_TOOLS
            .iter()
            .map(|name| ToolStatus {
                name: name.to_string(),
                path: find_in_path(name).map(|p| p.display().to_string()),
            })
            .collect(),
    }
}

/// Locate an executable on `PATH`
pub fn find_in_path(program: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
