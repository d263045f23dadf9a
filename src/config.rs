//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name holding the Slack tokens.
const KEYRING_SERVICE: &str = "agent-turnstile";

/// Slack credentials for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

/// Timeout values (seconds) governing agent runs and pending approvals.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Maximum silence on the agent's stdout before the run is abandoned.
    #[serde(default = "default_inactivity_seconds")]
    pub inactivity_seconds: u64,
    /// Age after which an unanswered approval is expired by the reaper.
    #[serde(default = "default_approval_ttl_seconds")]
    pub approval_ttl_seconds: u64,
    /// Interval between reaper sweeps.
    #[serde(default = "default_reaper_interval_seconds")]
    pub reaper_interval_seconds: u64,
    /// Time a finished agent gets to exit on its own before it is killed.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            inactivity_seconds: default_inactivity_seconds(),
            approval_ttl_seconds: default_approval_ttl_seconds(),
            reaper_interval_seconds: default_reaper_interval_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Inactivity bound for a single read from the agent stream.
    #[must_use]
    pub fn inactivity(&self) -> Duration {
        Duration::from_secs(self.inactivity_seconds)
    }

    /// Staleness threshold for pending approvals.
    #[must_use]
    pub fn approval_ttl(&self) -> Duration {
        Duration::from_secs(self.approval_ttl_seconds)
    }

    /// Poll interval of the reaper loop.
    #[must_use]
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }

    /// Grace period before a finished agent process is force-killed.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

fn default_inactivity_seconds() -> u64 {
    300
}

fn default_approval_ttl_seconds() -> u64 {
    600
}

fn default_reaper_interval_seconds() -> u64 {
    60
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

fn default_host_cli() -> String {
    "claude".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Working directory given to users who have not chosen one.
    pub default_workspace_root: PathBuf,
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Slack user IDs allowed to talk to the agent.
    #[serde(default)]
    pub authorized_user_ids: Vec<String>,
    /// Agent CLI binary.
    #[serde(default = "default_host_cli")]
    pub host_cli: String,
    /// Extra arguments placed before the generated ones.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Location of the conversation store; derived from the workspace when absent.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack credentials from OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// the required tokens.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        Ok(())
    }

    /// Absolute path to the default workspace root.
    #[must_use]
    pub fn default_workspace_root(&self) -> &Path {
        &self.default_workspace_root
    }

    /// Path of the `SQLite` conversation store.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            self.default_workspace_root
                .join(".agent-turnstile")
                .join("state.db")
        })
    }

    /// Check whether a Slack user may use the bridge at all.
    #[must_use]
    pub fn is_authorized(&self, user_id: &str) -> bool {
        self.authorized_user_ids.iter().any(|id| id == user_id)
    }

    /// Validate that a Slack user is on the allowlist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the user is not in the allowed list.
    pub fn ensure_authorized(&self, user_id: &str) -> Result<()> {
        if self.is_authorized(user_id) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("user is not authorized".into()))
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.authorized_user_ids.is_empty() {
            return Err(AppError::Config(
                "authorized_user_ids must not be empty".into(),
            ));
        }

        if self.host_cli.trim().is_empty() {
            return Err(AppError::Config("host_cli must not be empty".into()));
        }

        let t = &self.timeouts;
        if t.inactivity_seconds == 0 || t.approval_ttl_seconds == 0 || t.reaper_interval_seconds == 0
        {
            return Err(AppError::Config(
                "timeouts must be greater than zero".into(),
            ));
        }

        let canonical_root = self
            .default_workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("default_workspace_root invalid: {err}")))?;
        self.default_workspace_root = canonical_root;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
