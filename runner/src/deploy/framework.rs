//! Framework detection for checked-out source trees

use std::fmt;

use crate::deploy::command::ShellCommand;
use crate::errors::RunnerError;
use crate::filesys::dir::Dir;

const NEXT_CONFIG_FILES: &[&str] = &["next.config.js", "next.config.mjs", "next.config.ts"];

/// Build framework of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Laravel,
    NextJs,
}

impl Framework {
    /// Inspect the root of a source tree, first match wins
    pub async fn detect(root: &Dir) -> Result<Self, RunnerError> {
        if root.has_file("artisan").await {
            return Ok(Framework::Laravel);
        }

        for name in NEXT_CONFIG_FILES {
            if root.has_file(name).await {
                return Ok(Framework::NextJs);
            }
        }

        if let Some(manifest) = root.read_file("package.json").await {
            if manifest.contains("\"next\"") {
                return Ok(Framework::NextJs);
            }
        }

        Err(RunnerError::UnknownFramework)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Laravel => "laravel",
            Framework::NextJs => "nextjs",
        }
    }

    /// Ordered build commands, run inside `dir`
    pub fn build_commands(&self, dir: &str) -> Vec<ShellCommand> {
        let commands = match self {
            Framework::Laravel => vec![
                ShellCommand::new("composer").args(["install", "--no-dev", "--optimize-autoloader"]),
                ShellCommand::new("php").args(["artisan", "config:cache"]),
                ShellCommand::new("php").args(["artisan", "route:cache"]),
                ShellCommand::new("php").args(["artisan", "view:cache"]),
            ],
            Framework::NextJs => vec![
                ShellCommand::new("npm").arg("install"),
                ShellCommand::new("npm").args(["run", "build"]),
            ],
        };

        commands.into_iter().map(|c| c.current_dir(dir)).collect()
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
