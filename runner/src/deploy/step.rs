//! Deployment steps and the step runner

use tracing::{error, warn};

use crate::deploy::command::ShellCommand;
use crate::deploy::executor::CommandExecutor;
use crate::deploy::report::JobReporter;
use crate::errors::RunnerError;

/// Output forwarded to the job log is cut to this many characters
pub const MAX_LOG_OUTPUT_CHARS: usize = 500;

/// Marker appended to truncated output
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// What a step failure means for the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// The pipeline aborts and the job fails
    Fatal,

    /// The failure is logged as a warning and the pipeline continues
    BestEffort,
}

/// One logical unit of work inside a pipeline
#[derive(Debug, Clone)]
pub struct DeploymentStep {
    pub name: String,
    pub command: ShellCommand,
    pub criticality: Criticality,

    /// Error raised when a fatal step fails
    pub error: fn(String) -> RunnerError,
}

impl DeploymentStep {
    pub fn fatal(name: impl Into<String>, command: ShellCommand) -> Self {
        Self {
            name: name.into(),
            command,
            criticality: Criticality::Fatal,
            error: RunnerError::CommandFailed,
        }
    }

    pub fn best_effort(name: impl Into<String>, command: ShellCommand) -> Self {
        Self {
            name: name.into(),
            command,
            criticality: Criticality::BestEffort,
            error: RunnerError::CommandFailed,
        }
    }

    /// Use a specific error variant when this step fails fatally
    pub fn with_error(mut self, error: fn(String) -> RunnerError) -> Self {
        self.error = error;
        self
    }
}

/// Result of one executed step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub name: String,

    /// Truncated command output
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Run steps in order.
///
/// Returns the outcome of every executed step, or the first fatal failure.
/// Best-effort failures are reported and skipped.
pub async fn run_steps<E>(
    executor: &E,
    steps: &[DeploymentStep],
    reporter: &JobReporter,
) -> Result<Vec<StepOutcome>, RunnerError>
where
    E: CommandExecutor + ?Sized,
{
    let mut outcomes = Vec::with_capacity(steps.len());

    for step in steps {
        let outcome = run_step(executor, step, reporter).await;

        if let Some(detail) = &outcome.error {
            match step.criticality {
                Criticality::Fatal => {
                    error!("Step '{}' failed on {}: {}", step.name, executor.context(), detail);
                    reporter
                        .log(format!("[Runner] ❌ {} failed: {}", step.name, detail))
                        .await;
                    return Err((step.error)(format!("{}: {}", step.name, detail)));
                }
                Criticality::BestEffort => {
                    warn!(
                        "Step '{}' failed on {}, continuing: {}",
                        step.name,
                        executor.context(),
                        detail
                    );
                    reporter
                        .log(format!("[Runner] ⚠️ {} failed (continuing): {}", step.name, detail))
                        .await;
                }
            }
        }

        outcomes.push(outcome);
    }

    Ok(outcomes)
}

async fn run_step<E>(executor: &E, step: &DeploymentStep, reporter: &JobReporter) -> StepOutcome
where
    E: CommandExecutor + ?Sized,
{
    reporter
        .log(format!("[Runner] {}: executing {}", step.name, step.command))
        .await;

    match executor.execute(&step.command).await {
        Ok(out) if out.success => {
            let output = truncate_output(out.output.trim());
            reporter
                .log(format!("[Runner] ✅ {} completed\n{}", step.name, output))
                .await;
            StepOutcome {
                name: step.name.clone(),
                output,
                success: true,
                error: None,
            }
        }
        Ok(out) => {
            let output = truncate_output(out.output.trim());
            let code = out
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            StepOutcome {
                name: step.name.clone(),
                error: Some(format!("exit status {}\nOutput: {}", code, output)),
                output,
                success: false,
            }
        }
        Err(e) => StepOutcome {
            name: step.name.clone(),
            output: String::new(),
            success: false,
            error: Some(e.to_string()),
        },
    }
}

/// Cut output to [`MAX_LOG_OUTPUT_CHARS`] characters plus a marker
pub fn truncate_output(output: &str) -> String {
    match output.char_indices().nth(MAX_LOG_OUTPUT_CHARS) {
        Some((idx, _)) => format!("{}{}", &output[..idx], TRUNCATION_MARKER),
        None => output.to_string(),
    }
}
