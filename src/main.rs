#![forbid(unsafe_code)]

//! `agent-turnstile`: Slack bridge for a headless coding agent.
//!
//! Bootstraps configuration, the conversation store, the approval gate and
//! its reaper, and the Slack Socket Mode integration.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use agent_turnstile::agent::{CliLauncher, SpawnConfig};
use agent_turnstile::config::GlobalConfig;
use agent_turnstile::gate::ApprovalGate;
use agent_turnstile::orchestrator::reaper::{notify_expired, spawn_reaper};
use agent_turnstile::orchestrator::{EventPump, InFlight, Orchestrator};
use agent_turnstile::persistence::continuity_repo::ContinuityRepo;
use agent_turnstile::persistence::db;
use agent_turnstile::slack::client::SlackService;
use agent_turnstile::state::AppState;
use agent_turnstile::surface::ChatSurface;
use agent_turnstile::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-turnstile", about = "Slack bridge for a headless coding agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the default workspace root for new conversations.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-turnstile bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Some(ws) = args.workspace {
        let canonical = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.default_workspace_root = canonical;
    }

    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(workspace = %config.default_workspace_root().display(), "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    let continuity = ContinuityRepo::new(db);
    info!("database connected");

    // ── Build the orchestration core ────────────────────
    let timeouts = &config.timeouts;
    let pump = EventPump::new(
        continuity.clone(),
        timeouts.inactivity(),
        timeouts.shutdown_grace(),
    );
    let gate = ApprovalGate::new(pump);
    let launcher = Arc::new(CliLauncher::new(SpawnConfig {
        host_cli: config.host_cli.clone(),
        host_cli_args: config.host_cli_args.clone(),
    }));
    let orchestrator = Orchestrator::new(launcher, gate.clone());

    // ── Start Slack ─────────────────────────────────────
    let slack = Arc::new(SlackService::start(&config.slack).map_err(|err| {
        error!(%err, "slack service start failed");
        err
    })?);
    let surface: Arc<dyn ChatSurface> = slack.clone();

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        continuity,
        orchestrator,
        surface: Arc::clone(&surface),
        in_flight: InFlight::new(),
    });
    let socket_handle = slack.spawn_socket_mode(Arc::clone(&state));

    // ── Start reaper ────────────────────────────────────
    let ct = CancellationToken::new();
    let reaper_handle = spawn_reaper(
        gate.clone(),
        Arc::clone(&surface),
        timeouts.reaper_interval(),
        timeouts.approval_ttl(),
        ct.clone(),
    );
    info!("agent-turnstile ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    graceful_shutdown(&gate, surface.as_ref()).await;

    socket_handle.abort();
    if let Err(err) = reaper_handle.await {
        warn!(%err, "reaper task failed");
    }
    info!("agent-turnstile shut down");

    Ok(())
}

/// Terminate every suspended agent and tell its owner.
async fn graceful_shutdown(gate: &ApprovalGate, surface: &dyn ChatSurface) {
    async {
        let drained = gate.drain().await;
        for entry in &drained {
            notify_expired(surface, entry, "Server shutting down").await;
        }
        info!(approvals = drained.len(), "pending approvals discarded");
    }
    .instrument(tracing::info_span!("graceful_shutdown"))
    .await;
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = ctrl_c => {
                        if let Err(err) = result {
                            warn!(%err, "ctrl-c signal handler failed");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                if let Err(err) = ctrl_c.await {
                    warn!(%err, "ctrl-c signal handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            warn!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
