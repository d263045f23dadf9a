//! Inbound message and decision flows, independent of the chat platform.
//!
//! The Slack handlers translate platform payloads into [`InboundMessage`]
//! and [`InboundDecision`] and call into this module.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::gate::Decision;
use crate::git::workspace_label;
use crate::models::outcome::OrchestratorOutcome;
use crate::models::thread::{MessageRef, ThreadRef};
use crate::orchestrator::RunRequest;
use crate::progress::{NullSink, ProgressSink, StatusBoard};
use crate::state::AppState;
use crate::surface::{deliver_outcome, ChatSurface, Outbound};
use crate::AppError;

/// Reply when a user's previous run is still going.
pub const BUSY_NOTICE: &str = "\u{23f3} Still working on your previous request.";

/// Card text when a decision arrives for a request that is gone.
pub const STALE_NOTICE: &str = "\u{26a0}\u{fe0f} This request was already handled or has expired.";

/// Ephemeral reply when someone other than the owner decides.
pub const NOT_OWNER_NOTICE: &str = "Only the user who started this request can decide on it.";

/// A chat message addressed to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender.
    pub user_id: String,
    /// Thread to reply in.
    pub thread: ThreadRef,
    /// Prompt text.
    pub text: String,
}

/// A button press on an approval card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDecision {
    /// Gate identifier carried by the button.
    pub approval_id: String,
    /// Approve or reject.
    pub decision: Decision,
    /// Who pressed the button.
    pub user_id: String,
    /// The message that carried the button.
    pub origin: Option<MessageRef>,
}

/// Run the agent for an inbound chat message and post the outcome.
pub async fn handle_message(state: &AppState, message: InboundMessage) {
    let InboundMessage {
        user_id,
        thread,
        text,
    } = message;

    if let Err(err) = state.config.ensure_authorized(&user_id) {
        warn!(user_id, %err, "unauthorized user sent a message (ignored)");
        return;
    }
    let prompt = text.trim().to_owned();
    if prompt.is_empty() {
        return;
    }

    let Some(_guard) = state.in_flight.try_acquire(&user_id) else {
        post_text(state.surface.as_ref(), &thread, BUSY_NOTICE).await;
        return;
    };

    let continuity = match state
        .continuity
        .get_or_create(&user_id, state.config.default_workspace_root())
        .await
    {
        Ok(continuity) => continuity,
        Err(err) => {
            warn!(user_id, %err, "failed to load conversation");
            post_text(
                state.surface.as_ref(),
                &thread,
                "\u{26a0}\u{fe0f} Could not load your conversation.",
            )
            .await;
            return;
        }
    };

    info!(user_id, cwd = %continuity.workspace_root.display(), "starting agent run");
    let header = workspace_label(&continuity.workspace_root).await;
    let status = start_status(state, &thread, &header).await;

    let request = RunRequest {
        user_id: user_id.clone(),
        thread: thread.clone(),
        prompt,
        workspace_root: continuity.workspace_root,
        resume_id: continuity.resume_id,
    };
    let (sink, board) = open_sink(state, status.as_ref(), &header);
    let outcome = state.orchestrator.run(request, sink.as_ref()).await;
    close_sink(sink, board).await;

    if let Some(status) = &status {
        finish_status(state.surface.as_ref(), status, &header, &outcome).await;
    }
    deliver_outcome(state.surface.as_ref(), state.gate(), &thread, &outcome).await;
}

/// Apply an approval decision and post what follows.
pub async fn handle_decision(state: &AppState, inbound: InboundDecision) {
    let InboundDecision {
        approval_id,
        decision,
        user_id,
        origin,
    } = inbound;

    if let Err(err) = state.config.ensure_authorized(&user_id) {
        warn!(user_id, %err, "unauthorized user attempted approval action (ignored)");
        return;
    }

    let Some(view) = state.gate().view(&approval_id).await else {
        mark_stale(state.surface.as_ref(), origin.as_ref()).await;
        return;
    };

    if view.user_id != user_id {
        warn!(user_id, approval_id, "non-owner attempted approval action");
        whisper(state, &view.thread, &user_id, NOT_OWNER_NOTICE).await;
        return;
    }

    let Some(_guard) = state.in_flight.try_acquire(&user_id) else {
        whisper(state, &view.thread, &user_id, BUSY_NOTICE).await;
        return;
    };

    let card = origin.or(view.card);
    let approved = decision == Decision::Approve;
    let header = decision_line(approved, &user_id, view.request.file_name());
    if let Some(card) = &card {
        if let Err(err) = state
            .surface
            .edit(card, Outbound::Text(header.clone()))
            .await
        {
            warn!(%err, approval_id, "failed to mark approval card");
        }
    }

    let (sink, board) = open_sink(state, card.as_ref(), &header);
    let resolution = state
        .gate()
        .resolve(&approval_id, decision, &user_id, sink.as_ref())
        .await;
    close_sink(sink, board).await;

    match resolution {
        Ok(resolution) => {
            if let Some(card) = &card {
                if let Err(err) = state
                    .surface
                    .edit(card, Outbound::Text(header.clone()))
                    .await
                {
                    warn!(%err, approval_id, "failed to finalize approval card");
                }
            }
            deliver_outcome(
                state.surface.as_ref(),
                state.gate(),
                &resolution.thread,
                &resolution.outcome,
            )
            .await;
        }
        Err(AppError::NotFound(_)) => mark_stale(state.surface.as_ref(), card.as_ref()).await,
        Err(AppError::Unauthorized(_)) => {
            whisper(state, &view.thread, &user_id, NOT_OWNER_NOTICE).await;
        }
        Err(err) => warn!(%err, approval_id, "approval resolution failed"),
    }
}

/// Progress sink for a run: a status board on `status`, or nothing.
fn open_sink(
    state: &AppState,
    status: Option<&MessageRef>,
    header: &str,
) -> (Box<dyn ProgressSink>, Option<JoinHandle<()>>) {
    match status {
        Some(status) => {
            let (board, task) =
                StatusBoard::spawn(Arc::clone(&state.surface), status.clone(), header.to_owned());
            (Box::new(board), Some(task))
        }
        None => (Box::new(NullSink), None),
    }
}

/// Stop the status board and wait for its last edit so later edits win.
async fn close_sink(sink: Box<dyn ProgressSink>, task: Option<JoinHandle<()>>) {
    drop(sink);
    if let Some(task) = task {
        if let Err(err) = task.await {
            warn!(%err, "status board task failed");
        }
    }
}

async fn start_status(state: &AppState, thread: &ThreadRef, header: &str) -> Option<MessageRef> {
    match state
        .surface
        .send(thread, Outbound::Text(format!("{header}\n\nWorking...")))
        .await
    {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(%err, "failed to post status message");
            None
        }
    }
}

async fn finish_status(
    surface: &dyn ChatSurface,
    status: &MessageRef,
    header: &str,
    outcome: &OrchestratorOutcome,
) {
    let line = match outcome {
        OrchestratorOutcome::Completed { .. } => "\u{2705} Done",
        OrchestratorOutcome::AwaitingApproval { .. } => "\u{23f8}\u{fe0f} Waiting for approval",
        OrchestratorOutcome::Rejected => "\u{274c} Stopped",
        OrchestratorOutcome::Failed { .. } => "\u{26a0}\u{fe0f} Failed",
    };
    if let Err(err) = surface
        .edit(status, Outbound::Text(format!("{header}\n\n{line}")))
        .await
    {
        warn!(%err, "failed to finalize status message");
    }
}

async fn mark_stale(surface: &dyn ChatSurface, card: Option<&MessageRef>) {
    if let Some(card) = card {
        if let Err(err) = surface.edit(card, Outbound::Text(STALE_NOTICE.into())).await {
            warn!(%err, "failed to mark stale approval card");
        }
    }
}

async fn whisper(state: &AppState, thread: &ThreadRef, user_id: &str, text: &str) {
    if let Err(err) = state.surface.whisper(thread, user_id, text).await {
        warn!(%err, user_id, "failed to send ephemeral notice");
    }
}

async fn post_text(surface: &dyn ChatSurface, thread: &ThreadRef, text: &str) {
    if let Err(err) = surface.send(thread, Outbound::Text(text.to_owned())).await {
        warn!(%err, "failed to post notice");
    }
}

/// Status line placed on a decided approval card.
#[must_use]
pub fn decision_line(approved: bool, user_id: &str, file_name: &str) -> String {
    if approved {
        format!("\u{2705} *Approved* by <@{user_id}>: `{file_name}`")
    } else {
        format!("\u{274c} *Rejected* by <@{user_id}>: `{file_name}`")
    }
}
