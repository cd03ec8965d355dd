//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::{default_composer_bin, Settings};
use crate::workers::poller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Control plane base URL
    pub backend_base_url: String,

    /// Runner bearer token
    pub token: SecretString,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Poller worker options
    pub poller: poller::Options,

    /// Upper bound for a single deployment command
    pub command_timeout: Duration,

    /// Composer binary used on remote hosts
    pub composer_bin: String,
}

impl AppOptions {
    /// Build options from validated settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            backend_base_url: settings.backend.base_url.clone(),
            token: settings.backend.token.clone(),
            layout: StorageLayout::new(settings.work_dir.clone()),
            poller: poller::Options {
                interval: settings.polling_interval(),
                ..Default::default()
            },
            command_timeout: settings.command_timeout(),
            composer_bin: settings.composer_bin.clone(),
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            backend_base_url: "http://localhost:8000".to_string(),
            token: SecretString::from(String::new()),
            layout: StorageLayout::default(),
            poller: poller::Options::default(),
            command_timeout: Duration::from_secs(600),
            composer_bin: default_composer_bin(),
        }
    }
}

/// Lifecycle options for the runner
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown. A running job is allowed to
    /// finish, so this is generous.
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(15 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    #[test]
    fn test_from_settings() {
        let env = |key: &str| match key {
            "DEPLOYR_RUNNER_TOKEN" => Some("abc".to_string()),
            "DEPLOYR_POLL_INTERVAL_SECS" => Some("9".to_string()),
            "DEPLOYR_WORK_DIR" => Some("/var/lib/deployr".to_string()),
            _ => None,
        };
        let settings = Settings::from_sources(env, &HashMap::new()).unwrap();
        let options = AppOptions::from_settings(&settings);

        assert_eq!(options.poller.interval, Duration::from_secs(9));
        assert_eq!(options.layout.work_dir, std::path::PathBuf::from("/var/lib/deployr"));
        assert_eq!(options.token.expose_secret(), "abc");
        assert_eq!(options.command_timeout, Duration::from_secs(600));
    }
}
