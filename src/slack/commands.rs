//! `/agent` slash command router.
//!
//! | Command               | Effect                                         |
//! |-----------------------|------------------------------------------------|
//! | `/agent new [path]`   | Start a fresh conversation (optionally elsewhere) |
//! | `/agent cwd [path]`   | Show or change the working directory           |
//! | `/agent status`       | Show the current conversation                  |
//! | `/agent git <args>`   | Run git in the working directory               |
//! | `/agent help`         | List commands                                  |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector, SlackCommandEvent,
    SlackCommandEventResponse, SlackMessageContent, SlackMessageResponseType,
};
use tracing::{info, warn};

use crate::git::{run_git, workspace_label, GIT_COMMAND_TIMEOUT};
use crate::state::AppState;
use crate::{AppError, Result};

/// Reply to `/agent git` without arguments.
pub const GIT_USAGE: &str = "Usage: `/agent git <command>`, for example `/agent git status`";

/// Help text listing all subcommands.
pub const HELP_TEXT: &str = "*Commands*\n\
    `/agent new [path]` start a new conversation\n\
    `/agent cwd` show the working directory\n\
    `/agent cwd <path>` change the working directory\n\
    `/agent status` show the current conversation\n\
    `/agent git <args>` run a git command in the working directory\n\
    `/agent help` show this help\n\n\
    Any other message is sent to the agent.";

/// Resolve a user-supplied directory against `base`.
///
/// Expands a leading `~`, joins relative paths onto `base` and requires the
/// result to be an existing directory.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the directory does not exist.
pub fn resolve_dir(raw: &str, base: &Path) -> Result<PathBuf> {
    let raw = raw.trim();
    let expanded = match raw.strip_prefix('~') {
        Some(rest) => {
            let home = std::env::var("HOME")
                .map_err(|_| AppError::NotFound("HOME is not set".into()))?;
            PathBuf::from(home).join(rest.trim_start_matches('/'))
        }
        None => PathBuf::from(raw),
    };
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };

    match joined.canonicalize() {
        Ok(path) if path.is_dir() => Ok(path),
        _ => Err(AppError::NotFound(format!(
            "Directory not found: {}",
            joined.display()
        ))),
    }
}

/// Execute `/agent <text>` for `user_id` and return the reply.
pub async fn execute(state: &AppState, user_id: &str, text: &str) -> String {
    if let Err(err) = state.config.ensure_authorized(user_id) {
        warn!(user_id, %err, "unauthorized user attempted slash command");
        return "Unauthorized.".into();
    }

    let text = text.trim();
    let (verb, arg) = text
        .split_once(char::is_whitespace)
        .map_or((text, ""), |(verb, arg)| (verb, arg.trim()));

    let result = match verb {
        "new" => new_conversation(state, user_id, arg).await,
        "cwd" => change_directory(state, user_id, arg).await,
        "status" => status(state, user_id).await,
        "git" => git(state, user_id, arg).await,
        "" | "help" => Ok(HELP_TEXT.to_owned()),
        other => Ok(format!("Unknown command `{other}`.\n\n{HELP_TEXT}")),
    };

    result.unwrap_or_else(|err| match err {
        AppError::NotFound(msg) | AppError::Timeout(msg) => msg,
        other => {
            warn!(user_id, %other, "slash command failed");
            "\u{26a0}\u{fe0f} Command failed.".into()
        }
    })
}

async fn new_conversation(state: &AppState, user_id: &str, arg: &str) -> Result<String> {
    let root = if arg.is_empty() {
        state.config.default_workspace_root().to_path_buf()
    } else {
        let base = current_root(state, user_id).await?;
        resolve_dir(arg, &base)?
    };
    let conversation = state.continuity.reset(user_id, &root).await?;
    info!(user_id, label = %conversation.label, "conversation reset");
    Ok(format!(
        "New conversation started.\n\nSession: `{}`\nDirectory: {}",
        conversation.label,
        workspace_label(&conversation.workspace_root).await
    ))
}

async fn change_directory(state: &AppState, user_id: &str, arg: &str) -> Result<String> {
    let current = current_root(state, user_id).await?;
    if arg.is_empty() {
        return Ok(workspace_label(&current).await);
    }
    let root = resolve_dir(arg, &current)?;
    let conversation = state.continuity.set_workspace(user_id, &root).await?;
    Ok(workspace_label(&conversation.workspace_root).await)
}

async fn git(state: &AppState, user_id: &str, arg: &str) -> Result<String> {
    let args: Vec<&str> = arg.split_whitespace().collect();
    if args.is_empty() {
        return Ok(GIT_USAGE.to_owned());
    }
    let root = current_root(state, user_id).await?;
    info!(user_id, command = ?args, "running git command");
    run_git(&root, &args, GIT_COMMAND_TIMEOUT).await
}

async fn status(state: &AppState, user_id: &str) -> Result<String> {
    let conversation = state
        .continuity
        .get_or_create(user_id, state.config.default_workspace_root())
        .await?;
    let pending = state.gate().pending_for(user_id).await;
    let running = if state.in_flight.is_busy(user_id) {
        "yes"
    } else {
        "no"
    };
    Ok(format!(
        "*Status*\n\nSession: `{}`\nDirectory: {}\nResumable: {}\nRunning: {running}\nPending approvals: {pending}\nCreated: {}",
        conversation.label,
        workspace_label(&conversation.workspace_root).await,
        if conversation.resume_id.is_some() { "yes" } else { "no" },
        conversation.created_at.format("%Y-%m-%d"),
    ))
}

async fn current_root(state: &AppState, user_id: &str) -> Result<PathBuf> {
    Ok(state
        .continuity
        .get_or_create(user_id, state.config.default_workspace_root())
        .await?
        .workspace_root)
}

/// Handle incoming slash commands routed via Socket Mode.
///
/// # Errors
///
/// Never fails; problems are reported in the ephemeral reply.
pub async fn handle_command(
    event: SlackCommandEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::AnyStdResult<SlackCommandEventResponse> {
    info!(command = ?event.command, user = ?event.user_id, "received slash command");

    let app_state: Option<Arc<AppState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<AppState>>().cloned()
    };

    let reply = match app_state {
        Some(app) => {
            execute(
                &app,
                &event.user_id.to_string(),
                event.text.as_deref().unwrap_or_default(),
            )
            .await
        }
        None => "Not ready yet; try again shortly.".to_owned(),
    };

    Ok(SlackCommandEventResponse {
        content: SlackMessageContent {
            text: Some(reply),
            blocks: None,
            attachments: None,
            upload: None,
            files: None,
            reactions: None,
            metadata: None,
        },
        response_type: Some(SlackMessageResponseType::Ephemeral),
    })
}
