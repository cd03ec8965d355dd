//! Deployment commands and shell rendering

use std::fmt;

/// Characters that force an argument to be quoted
const SHELL_META: &[char] = &[
    ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}', '<',
    '>', '|', '&', ';', '#', '~', '=', '%',
];

/// A program invocation with an optional working directory.
///
/// Arguments are kept as a vector so a local run never goes through a shell,
/// and a remote run renders every argument single-quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Render as a single POSIX shell line, e.g. `cd -- '/srv/app' && git pull origin main`
    pub fn to_shell_line(&self) -> String {
        let invocation = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| quote_arg(a))
            .collect::<Vec<_>>()
            .join(" ");

        match &self.cwd {
            Some(dir) => format!("cd -- {} && {}", quote_path(dir), invocation),
            None => invocation,
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote_arg(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote_arg(arg))?;
        }
        Ok(())
    }
}

/// Result of running a command to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout followed by stderr
    pub output: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn from_parts(stdout: &[u8], stderr: &[u8], success: bool, exit_code: Option<i32>) -> Self {
        let mut output = String::from_utf8_lossy(stdout).into_owned();
        let stderr = String::from_utf8_lossy(stderr);
        if !stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&stderr);
        }

        Self {
            output,
            success,
            exit_code,
        }
    }
}

/// Escape a value for use inside single quotes
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument, leaving plain words untouched
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote a path (always quoted)
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}
