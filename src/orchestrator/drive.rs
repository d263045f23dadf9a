//! Event pump shared by fresh runs and approved resumptions.
//!
//! Reads the agent's event stream until something terminal or suspending
//! happens. A resumed run continues from the exact stream position where it
//! was suspended because the same [`AgentHandle`] (and its read buffer) is
//! handed back in.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::agent::{classify, Action, AgentHandle, Event};
use crate::gate::ApprovalGate;
use crate::models::outcome::OrchestratorOutcome;
use crate::models::thread::ThreadRef;
use crate::persistence::continuity_repo::ContinuityRepo;
use crate::progress::ProgressSink;
use crate::AppError;

/// Upper bound, in characters, of a failure diagnostic.
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// Who a run belongs to and where it reports.
///
/// Travels with the agent handle into the approval gate and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Owner of the run.
    pub user_id: String,
    /// Thread receiving output for this run.
    pub thread: ThreadRef,
    /// Working directory of the agent.
    pub workspace_root: PathBuf,
    /// Continuity id the agent was launched with.
    pub resume_id: Option<String>,
    /// Most recent assistant text, used when the final answer is empty.
    pub last_text: Option<String>,
}

impl RunContext {
    /// Context for a new run.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        thread: ThreadRef,
        workspace_root: PathBuf,
        resume_id: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread,
            workspace_root,
            resume_id,
            last_text: None,
        }
    }
}

/// Drives agent event streams to an [`OrchestratorOutcome`].
pub struct EventPump {
    continuity: ContinuityRepo,
    inactivity: Duration,
    shutdown_grace: Duration,
}

impl EventPump {
    /// Create a pump.
    ///
    /// `inactivity` bounds each read from the stream; `shutdown_grace` is how
    /// long a finished agent may take to exit before it is killed.
    #[must_use]
    pub fn new(continuity: ContinuityRepo, inactivity: Duration, shutdown_grace: Duration) -> Self {
        Self {
            continuity,
            inactivity,
            shutdown_grace,
        }
    }

    /// Conversation store updated on completion.
    #[must_use]
    pub fn continuity(&self) -> &ContinuityRepo {
        &self.continuity
    }

    /// Consume events from `handle` until the run completes, fails or
    /// suspends in `gate`.
    ///
    /// Ownership of `handle` always leaves this function: it is parked in
    /// the gate, released in the background after completion, or terminated.
    pub async fn drive(
        &self,
        gate: &ApprovalGate,
        mut handle: AgentHandle,
        mut context: RunContext,
        sink: &dyn ProgressSink,
    ) -> OrchestratorOutcome {
        loop {
            let event = match handle.next_event(self.inactivity).await {
                Ok(Some(event)) => event,
                Ok(None) => return self.stream_ended(handle).await,
                Err(AppError::Timeout(_)) => {
                    warn!(user_id = %context.user_id, "agent inactive; terminating");
                    handle.terminate_quietly().await;
                    return OrchestratorOutcome::failed(format!(
                        "Request timed out after {}s without agent output.",
                        self.inactivity.as_secs()
                    ));
                }
                Err(err) => {
                    warn!(%err, "agent stream failed; terminating");
                    handle.terminate_quietly().await;
                    return OrchestratorOutcome::failed(bounded(&err.to_string()));
                }
            };

            if let Event::Text { text } = &event {
                if !text.trim().is_empty() {
                    context.last_text = Some(text.clone());
                }
            }

            match classify(&event) {
                Action::Ignore => {}
                Action::Progress(line) => {
                    debug!(%line, "agent progress");
                    sink.progress(&line);
                }
                Action::Mutate(request) => {
                    let approval_id = gate.submit(request.clone(), handle, context).await;
                    return OrchestratorOutcome::AwaitingApproval {
                        approval_id,
                        request,
                    };
                }
                Action::Done { text, resume_id } => {
                    let text = if text.trim().is_empty() {
                        context.last_text.take().unwrap_or_default()
                    } else {
                        text
                    };
                    if let Some(resume_id) = &resume_id {
                        self.record_completion(&context.user_id, resume_id).await;
                    }
                    tokio::spawn(handle.finish(self.shutdown_grace));
                    info!(user_id = %context.user_id, "agent run completed");
                    return OrchestratorOutcome::Completed { text, resume_id };
                }
                Action::Error(message) => {
                    warn!(user_id = %context.user_id, %message, "agent reported failure");
                    handle.terminate_quietly().await;
                    return OrchestratorOutcome::failed(bounded(&message));
                }
            }
        }
    }

    async fn record_completion(&self, user_id: &str, resume_id: &str) {
        if let Err(err) = self.continuity.update_resume_id(user_id, resume_id).await {
            warn!(user_id, %err, "failed to persist resume id");
        }
    }

    /// The stream closed without a completion event.
    async fn stream_ended(&self, mut handle: AgentHandle) -> OrchestratorOutcome {
        match handle.wait_exit(self.shutdown_grace).await {
            Ok(report) if !report.success() => {
                let detail = if report.stderr.trim().is_empty() {
                    format!("agent exited with status {:?}", report.code)
                } else {
                    report.stderr.trim().to_owned()
                };
                OrchestratorOutcome::failed(format!("Error: {}", bounded(&detail)))
            }
            Ok(_) => OrchestratorOutcome::failed("Agent finished without a response."),
            Err(err) => OrchestratorOutcome::failed(bounded(&err.to_string())),
        }
    }
}

/// Cut `text` to [`MAX_DIAGNOSTIC_CHARS`] characters.
#[must_use]
pub fn bounded(text: &str) -> String {
    text.chars().take(MAX_DIAGNOSTIC_CHARS).collect()
}
