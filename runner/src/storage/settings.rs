//! Runner settings
//!
//! Settings come from `DEPLOYR_*` environment variables and may be overridden
//! by `--key=value` command line arguments. They are validated once at startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::errors::RunnerError;
use crate::logs::LogLevel;

/// (CLI key, environment variable) pairs
pub const BACKEND_URL: (&str, &str) = ("backend-url", "DEPLOYR_BACKEND_URL");
pub const RUNNER_TOKEN: (&str, &str) = ("token", "DEPLOYR_RUNNER_TOKEN");
pub const WORK_DIR: (&str, &str) = ("work-dir", "DEPLOYR_WORK_DIR");
pub const POLL_INTERVAL: (&str, &str) = ("poll-interval", "DEPLOYR_POLL_INTERVAL_SECS");
pub const COMMAND_TIMEOUT: (&str, &str) = ("command-timeout", "DEPLOYR_COMMAND_TIMEOUT_SECS");
pub const COMPOSER_BIN: (&str, &str) = ("composer-bin", "DEPLOYR_COMPOSER_BIN");
pub const LOG_LEVEL: (&str, &str) = ("log-level", "DEPLOYR_LOG_LEVEL");
pub const LOG_JSON: (&str, &str) = ("log-json", "DEPLOYR_LOG_JSON");
pub const LOG_DIR: (&str, &str) = ("log-dir", "DEPLOYR_LOG_DIR");

/// Runner settings
#[derive(Debug)]
pub struct Settings {
    /// Log level
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    pub log_json: bool,

    /// Directory for rolling log files
    pub log_dir: Option<PathBuf>,

    /// Control plane configuration
    pub backend: BackendSettings,

    /// Local directory holding per-job scratch checkouts
    pub work_dir: PathBuf,

    /// Polling interval in seconds
    pub polling_interval_secs: u64,

    /// Upper bound for a single deployment command in seconds
    pub command_timeout_secs: u64,

    /// Composer binary used on remote hosts
    pub composer_bin: String,
}

/// Control plane settings
#[derive(Debug)]
pub struct BackendSettings {
    /// Base URL of the control plane
    pub base_url: String,

    /// Runner bearer token
    pub token: SecretString,
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./deployments")
}

fn default_polling_interval() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    600
}

pub fn default_composer_bin() -> String {
    "/opt/cpanel/composer/bin/composer".to_string()
}

impl Settings {
    /// Load settings from the process environment and CLI overrides
    pub fn load(cli_args: &HashMap<String, String>) -> Result<Self, RunnerError> {
        Self::from_sources(|key| std::env::var(key).ok(), cli_args)
    }

    /// Load settings from an arbitrary environment lookup and CLI overrides
    pub fn from_sources<F>(env: F, cli_args: &HashMap<String, String>) -> Result<Self, RunnerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |(cli_key, env_key): (&str, &str)| -> Option<String> {
            cli_args
                .get(cli_key)
                .cloned()
                .or_else(|| env(env_key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = get(RUNNER_TOKEN).ok_or_else(|| {
            RunnerError::ConfigError(format!("{} environment variable is required", RUNNER_TOKEN.1))
        })?;

        let log_level = match get(LOG_LEVEL) {
            Some(level) => level.parse().map_err(RunnerError::ConfigError)?,
            None => LogLevel::default(),
        };

        let settings = Self {
            log_level,
            log_json: get(LOG_JSON).map(|v| parse_bool(LOG_JSON.1, &v)).transpose()?.unwrap_or(false),
            log_dir: get(LOG_DIR).map(PathBuf::from),
            backend: BackendSettings {
                base_url: get(BACKEND_URL)
                    .unwrap_or_else(default_backend_url)
                    .trim_end_matches('/')
                    .to_string(),
                token: SecretString::from(token),
            },
            work_dir: get(WORK_DIR).map(PathBuf::from).unwrap_or_else(default_work_dir),
            polling_interval_secs: get(POLL_INTERVAL)
                .map(|v| parse_secs(POLL_INTERVAL.1, &v))
                .transpose()?
                .unwrap_or_else(default_polling_interval),
            command_timeout_secs: get(COMMAND_TIMEOUT)
                .map(|v| parse_secs(COMMAND_TIMEOUT.1, &v))
                .transpose()?
                .unwrap_or_else(default_command_timeout),
            composer_bin: get(COMPOSER_BIN).unwrap_or_else(default_composer_bin),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.backend.token.expose_secret().is_empty() {
            return Err(RunnerError::ConfigError(format!(
                "{} environment variable is required",
                RUNNER_TOKEN.1
            )));
        }

        let url = url::Url::parse(&self.backend.base_url).map_err(|e| {
            RunnerError::ConfigError(format!("Invalid backend URL '{}': {}", self.backend.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RunnerError::ConfigError(format!(
                "Backend URL must use http or https: {}",
                self.backend.base_url
            )));
        }

        if self.polling_interval_secs == 0 || self.command_timeout_secs == 0 {
            return Err(RunnerError::ConfigError(
                "Polling interval and command timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, RunnerError> {
    value
        .parse::<u64>()
        .map_err(|_| RunnerError::ConfigError(format!("{} must be a number of seconds, got '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, RunnerError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RunnerError::ConfigError(format!("{} must be a boolean, got '{}'", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let result = Settings::from_sources(env_from(&[]), &HashMap::new());
        assert!(matches!(result, Err(RunnerError::ConfigError(_))));
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::from_sources(env_from(&[("DEPLOYR_RUNNER_TOKEN", "abc")]), &HashMap::new())
                .unwrap();
        assert_eq!(settings.backend.base_url, "http://localhost:8000");
        assert_eq!(settings.work_dir, PathBuf::from("./deployments"));
        assert_eq!(settings.polling_interval(), Duration::from_secs(5));
        assert_eq!(settings.command_timeout(), Duration::from_secs(600));
        assert_eq!(settings.composer_bin, default_composer_bin());
        assert_eq!(settings.log_level, LogLevel::Info);
        assert!(!settings.log_json);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut cli = HashMap::new();
        cli.insert("backend-url".to_string(), "https://deploy.example.com/".to_string());
        cli.insert("poll-interval".to_string(), "15".to_string());

        let settings = Settings::from_sources(
            env_from(&[
                ("DEPLOYR_RUNNER_TOKEN", "abc"),
                ("DEPLOYR_BACKEND_URL", "http://ignored:8000"),
                ("DEPLOYR_LOG_JSON", "yes"),
            ]),
            &cli,
        )
        .unwrap();

        assert_eq!(settings.backend.base_url, "https://deploy.example.com");
        assert_eq!(settings.polling_interval_secs, 15);
        assert!(settings.log_json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_url = Settings::from_sources(
            env_from(&[("DEPLOYR_RUNNER_TOKEN", "abc"), ("DEPLOYR_BACKEND_URL", "ftp://x")]),
            &HashMap::new(),
        );
        assert!(bad_url.is_err());

        let zero_interval = Settings::from_sources(
            env_from(&[("DEPLOYR_RUNNER_TOKEN", "abc"), ("DEPLOYR_POLL_INTERVAL_SECS", "0")]),
            &HashMap::new(),
        );
        assert!(zero_interval.is_err());

        let bad_level = Settings::from_sources(
            env_from(&[("DEPLOYR_RUNNER_TOKEN", "abc"), ("DEPLOYR_LOG_LEVEL", "loud")]),
            &HashMap::new(),
        );
        assert!(bad_level.is_err());
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let settings =
            Settings::from_sources(env_from(&[("DEPLOYR_RUNNER_TOKEN", "s3cret")]), &HashMap::new())
                .unwrap();
        assert!(!format!("{:?}", settings).contains("s3cret"));
    }
}
