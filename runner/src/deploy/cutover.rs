//! Public-path cutover
//!
//! The web root is repointed at `<remote_path>/public` with a symlink. Whatever
//! currently occupies the public path is classified first: real directories and
//! files are moved aside to a timestamped backup, stale symlinks are removed.

use std::path::{Component, Path};

use chrono::{DateTime, Utc};

use crate::deploy::command::ShellCommand;
use crate::deploy::step::DeploymentStep;

/// Shell probe printing one of `symlink`, `directory`, `file` or `missing`
const PROBE_SCRIPT: &str = r#"if [ -L "$1" ]; then echo symlink; elif [ -d "$1" ]; then echo directory; elif [ -e "$1" ]; then echo file; else echo missing; fi"#;

/// What currently occupies the public path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicPathState {
    Missing,
    Directory,
    Symlink,
    File,
}

impl PublicPathState {
    /// Parse the output of [`probe_command`], `None` for anything unexpected
    pub fn from_probe(output: &str) -> Option<Self> {
        match output.trim() {
            "missing" => Some(PublicPathState::Missing),
            "directory" => Some(PublicPathState::Directory),
            "symlink" => Some(PublicPathState::Symlink),
            "file" => Some(PublicPathState::File),
            _ => None,
        }
    }
}

/// Classify the public path. Symlinks are checked before directories so a link
/// to a directory is never mistaken for a real one.
pub fn probe_command(public_path: &str) -> ShellCommand {
    ShellCommand::new("sh").args(["-c", PROBE_SCRIPT, "sh", public_path])
}

/// Backup location for a public path, e.g. `public_html_backup_20240131120000`
pub fn backup_path(public_path: &str, now: DateTime<Utc>) -> String {
    format!("{}_backup_{}", public_path, now.format("%Y%m%d%H%M%S"))
}

/// Symlink target for `<remote_path>/public`. Relative remote paths live in
/// the login directory while a relative link resolves against the link's own
/// directory, so climb out of the public path's parent first.
pub fn link_target(public_path: &str, remote_path: &str) -> String {
    if Path::new(remote_path).is_absolute() {
        return format!("{}/public", remote_path);
    }

    let depth = Path::new(public_path)
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .count()
        })
        .unwrap_or(0);

    format!("{}{}/public", "../".repeat(depth), remote_path)
}

/// Steps that repoint `public_path` at the checkout's `public` directory.
///
/// The steps are fatal within the cutover group so a failed backup never
/// leads to linking over the old web root. The caller downgrades a failure
/// of the whole group to a warning.
pub fn plan_cutover(
    state: PublicPathState,
    public_path: &str,
    remote_path: &str,
    now: DateTime<Utc>,
) -> Vec<DeploymentStep> {
    let mut steps = Vec::with_capacity(2);

    match state {
        PublicPathState::Directory | PublicPathState::File => {
            steps.push(DeploymentStep::fatal(
                "Backup public path",
                ShellCommand::new("mv").args(["--", public_path, backup_path(public_path, now).as_str()]),
            ));
        }
        PublicPathState::Symlink => {
            steps.push(DeploymentStep::fatal(
                "Remove old symlink",
                ShellCommand::new("rm").args(["-f", "--", public_path]),
            ));
        }
        PublicPathState::Missing => {}
    }

    steps.push(DeploymentStep::fatal(
        "Link public path",
        ShellCommand::new("ln").args(["-s", "--", link_target(public_path, remote_path).as_str(), public_path]),
    ));

    steps
}
