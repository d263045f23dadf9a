//! Agent process launcher.
//!
//! Launches the headless agent CLI with:
//! - `kill_on_drop(true)` so abandoned handles never leak a process.
//! - `env_clear()` plus an allowlist so Slack tokens and other secrets are
//!   never visible to the agent.
//! - stdin closed; the prompt travels as an argument.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use super::process::{AgentHandle, ChildControl};
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned agent process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "TERM",
    "ANTHROPIC_API_KEY",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

// ── Configuration ────────────────────────────────────────────────────────────

/// Static launch settings taken from the global configuration.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Host CLI binary (e.g. `claude`).
    pub host_cli: String,
    /// Arguments placed before the generated ones.
    pub host_cli_args: Vec<String>,
}

/// Per-run launch parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Prompt forwarded to the agent.
    pub prompt: String,
    /// Working directory of the agent process.
    pub workspace_root: PathBuf,
    /// Conversation to resume, if any.
    pub resume_id: Option<String>,
}

/// Boxed future returned by [`AgentLauncher::launch`].
pub type LaunchFuture<'a> = Pin<Box<dyn Future<Output = Result<AgentHandle>> + Send + 'a>>;

/// Starts agent processes.
///
/// Production uses [`CliLauncher`]; tests substitute scripted handles.
pub trait AgentLauncher: Send + Sync {
    /// Start an agent for `request` and return its handle.
    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> LaunchFuture<'a>;
}

/// Argument vector for one run: configured args, then prompt, output format
/// and optional resume flag.
#[must_use]
pub fn build_args(config: &SpawnConfig, request: &LaunchRequest) -> Vec<String> {
    let mut args = config.host_cli_args.clone();
    args.extend([
        "-p".to_owned(),
        request.prompt.clone(),
        "--output-format".to_owned(),
        "stream-json".to_owned(),
    ]);
    if let Some(resume_id) = &request.resume_id {
        args.push("--resume".to_owned());
        args.push(resume_id.clone());
    }
    args
}

/// Launches the configured CLI as a child process.
#[derive(Debug, Clone)]
pub struct CliLauncher {
    config: SpawnConfig,
}

impl CliLauncher {
    /// Create a launcher for `config`.
    #[must_use]
    pub fn new(config: SpawnConfig) -> Self {
        Self { config }
    }
}

impl AgentLauncher for CliLauncher {
    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> LaunchFuture<'a> {
        Box::pin(async move { spawn_agent(&self.config, request) })
    }
}

/// Spawn the agent process described by `config` and `request`.
///
/// # Errors
///
/// - `AppError::Process("failed to spawn agent: …")`: OS spawn failure or
///   a missing working directory.
/// - `AppError::Process("failed to capture agent stdout")`: pipe setup failed.
pub fn spawn_agent(config: &SpawnConfig, request: &LaunchRequest) -> Result<AgentHandle> {
    let mut cmd = Command::new(&config.host_cli);
    cmd.args(build_args(config, request));

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    cmd.env("CLAUDE_CODE_DISABLE_NONESSENTIAL_TRAFFIC", "1");

    cmd.current_dir(&request.workspace_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Process(format!("failed to spawn agent: {err}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Process("failed to capture agent stdout".into()))?;

    info!(
        pid = child.id(),
        cwd = %request.workspace_root.display(),
        resume = request.resume_id.is_some(),
        "agent process started"
    );

    Ok(AgentHandle::new(stdout, ChildControl::new(child)))
}
