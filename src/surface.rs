//! Chat surface abstraction and outcome delivery.
//!
//! The orchestrator and gate never talk to Slack directly. Everything they
//! need to show a human goes through [`ChatSurface`], which the Slack client
//! implements and tests replace with a recorder.

use std::future::Future;
use std::pin::Pin;

use tracing::warn;

use crate::gate::ApprovalGate;
use crate::models::mutation::MutationRequest;
use crate::models::outcome::OrchestratorOutcome;
use crate::models::thread::{MessageRef, ThreadRef};
use crate::redact::redact;
use crate::Result;

/// Longest answer posted in one message, in characters.
pub const MAX_ANSWER_CHARS: usize = 3900;

/// Suffix appended to a shortened answer.
pub const TRUNCATED_MARKER: &str = "\n\n[Truncated]";

/// Boxed future returned by [`ChatSurface`] methods.
pub type SurfaceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Content of a posted or edited message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Plain markdown text.
    Text(String),
    /// Approval card for a pending mutation.
    Approval {
        /// Gate identifier carried by the card's buttons.
        approval_id: String,
        /// The mutation under review.
        request: MutationRequest,
    },
}

/// Where human-facing messages go.
pub trait ChatSurface: Send + Sync {
    /// Post `message` into `thread`, returning a reference for later edits.
    fn send<'a>(&'a self, thread: &'a ThreadRef, message: Outbound) -> SurfaceFuture<'a, MessageRef>;

    /// Replace the content of a previously posted message.
    fn edit<'a>(&'a self, message: &'a MessageRef, content: Outbound) -> SurfaceFuture<'a, ()>;

    /// Show `text` to `user_id` only.
    fn whisper<'a>(
        &'a self,
        thread: &'a ThreadRef,
        user_id: &'a str,
        text: &'a str,
    ) -> SurfaceFuture<'a, ()>;
}

/// Post the human-facing rendering of `outcome` into `thread`.
///
/// For [`OrchestratorOutcome::AwaitingApproval`] the posted card is attached
/// to the gate entry so later edits can target it. Delivery failures are
/// logged; they never affect the run.
pub async fn deliver_outcome(
    surface: &dyn ChatSurface,
    gate: &ApprovalGate,
    thread: &ThreadRef,
    outcome: &OrchestratorOutcome,
) {
    let message = outcome_message(outcome);

    match surface.send(thread, message).await {
        Ok(posted) => {
            if let OrchestratorOutcome::AwaitingApproval { approval_id, .. } = outcome {
                if !gate.attach_card(approval_id, posted).await {
                    warn!(approval_id, "approval resolved before its card was recorded");
                }
            }
        }
        Err(err) => warn!(%err, channel = %thread.channel, "failed to deliver outcome"),
    }
}

/// Human-facing rendering of `outcome`, with agent output redacted.
#[must_use]
pub fn outcome_message(outcome: &OrchestratorOutcome) -> Outbound {
    match outcome {
        OrchestratorOutcome::Completed { text, .. } => Outbound::Text(render_answer(text)),
        OrchestratorOutcome::AwaitingApproval {
            approval_id,
            request,
        } => Outbound::Approval {
            approval_id: approval_id.clone(),
            request: request.clone(),
        },
        OrchestratorOutcome::Rejected => {
            Outbound::Text("\u{274c} Change rejected. The agent was stopped.".into())
        }
        OrchestratorOutcome::Failed { reason } => {
            Outbound::Text(format!("\u{26a0}\u{fe0f} {}", redact(reason)))
        }
    }
}

/// Final answer text, redacted and bounded to [`MAX_ANSWER_CHARS`].
#[must_use]
pub fn render_answer(text: &str) -> String {
    let text = redact(text.trim());
    if text.is_empty() {
        return "No response from the agent.".into();
    }
    if text.chars().count() <= MAX_ANSWER_CHARS {
        return text;
    }
    let mut out: String = text.chars().take(MAX_ANSWER_CHARS).collect();
    out.push_str(TRUNCATED_MARKER);
    out
}
