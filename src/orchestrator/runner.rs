//! Entry point for a new agent run.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use super::drive::{bounded, RunContext};
use crate::agent::{AgentLauncher, LaunchRequest};
use crate::gate::ApprovalGate;
use crate::models::outcome::OrchestratorOutcome;
use crate::models::thread::ThreadRef;
use crate::progress::ProgressSink;
use crate::Result;

/// Parameters of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// User who sent the prompt.
    pub user_id: String,
    /// Thread that receives output.
    pub thread: ThreadRef,
    /// Prompt text.
    pub prompt: String,
    /// Agent working directory.
    pub workspace_root: PathBuf,
    /// Conversation to resume.
    pub resume_id: Option<String>,
}

/// Starts agent runs and drives them to their first outcome.
#[derive(Clone)]
pub struct Orchestrator {
    launcher: Arc<dyn AgentLauncher>,
    gate: ApprovalGate,
}

impl Orchestrator {
    /// Create an orchestrator that parks suspended runs in `gate`.
    #[must_use]
    pub fn new(launcher: Arc<dyn AgentLauncher>, gate: ApprovalGate) -> Self {
        Self { launcher, gate }
    }

    /// The approval gate holding suspended runs.
    #[must_use]
    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    /// Launch an agent for `request` and drive it until it completes, fails
    /// or asks for approval.
    ///
    /// Never returns an error: a launch failure becomes
    /// [`OrchestratorOutcome::Failed`].
    pub async fn run(&self, request: RunRequest, sink: &dyn ProgressSink) -> OrchestratorOutcome {
        let span = info_span!("run", user_id = %request.user_id, channel = %request.thread.channel);
        async move {
            let launch = LaunchRequest {
                prompt: request.prompt,
                workspace_root: request.workspace_root.clone(),
                resume_id: request.resume_id.clone(),
            };

            let handle = match self.launcher.launch(&launch).await {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(%err, "failed to launch agent");
                    return OrchestratorOutcome::failed(bounded(&format!(
                        "Failed to start agent: {err}"
                    )));
                }
            };
            info!(resume = launch.resume_id.is_some(), "agent launched");

            let context = RunContext::new(
                request.user_id,
                request.thread,
                request.workspace_root,
                request.resume_id,
            );
            self.gate
                .pump()
                .drive(&self.gate, handle, context, sink)
                .await
        }
        .instrument(span)
        .await
    }

    /// Run `prompt` in the user's stored conversation, creating one rooted at
    /// `default_root` on first contact.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the continuity record cannot be loaded.
    pub async fn run_conversation(
        &self,
        user_id: &str,
        thread: ThreadRef,
        prompt: String,
        default_root: &std::path::Path,
        sink: &dyn ProgressSink,
    ) -> Result<OrchestratorOutcome> {
        let continuity = self
            .gate
            .pump()
            .continuity()
            .get_or_create(user_id, default_root)
            .await?;

        let request = RunRequest {
            user_id: user_id.to_owned(),
            thread,
            prompt,
            workspace_root: continuity.workspace_root,
            resume_id: continuity.resume_id,
        };
        Ok(self.run(request, sink).await)
    }
}
