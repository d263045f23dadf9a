//! Approval gate: the registry of agent runs suspended on a file mutation.
//!
//! Each entry exclusively owns the suspended agent's handle. Exactly one of
//! approve, reject, expire or drain ever acts on an entry: every path removes
//! the entry while holding the registry lock and only then touches the
//! process, so the loser of a race observes `NotFound` and the process is
//! terminated at most once. The lock is never held across process I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};

use crate::agent::AgentHandle;
use crate::models::mutation::MutationRequest;
use crate::models::outcome::OrchestratorOutcome;
use crate::models::thread::{MessageRef, ThreadRef};
use crate::orchestrator::drive::{EventPump, RunContext};
use crate::progress::ProgressSink;
use crate::{AppError, Result};

/// A human decision on a pending mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Let the agent continue.
    Approve,
    /// Stop the agent.
    Reject,
}

/// A run parked until someone decides on its mutation.
#[derive(Debug)]
pub struct PendingApproval {
    /// Unique, unguessable identifier.
    pub id: String,
    /// The mutation under review.
    pub request: MutationRequest,
    /// Who started the run and where it reports.
    pub context: RunContext,
    /// The posted approval card, once known.
    pub card: Option<MessageRef>,
    /// When the entry was registered.
    pub created_at: Instant,
    handle: AgentHandle,
}

/// Read-only view of a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalView {
    /// Gate identifier.
    pub id: String,
    /// Owner of the suspended run.
    pub user_id: String,
    /// Thread the run reports to.
    pub thread: ThreadRef,
    /// The mutation under review.
    pub request: MutationRequest,
    /// The posted approval card, once known.
    pub card: Option<MessageRef>,
}

/// An entry removed by expiry or shutdown; its agent has been terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredApproval {
    /// Gate identifier.
    pub id: String,
    /// Owner of the discarded run.
    pub user_id: String,
    /// Thread the run reported to.
    pub thread: ThreadRef,
    /// Target of the discarded mutation.
    pub file_path: String,
    /// The approval card, if one was posted.
    pub card: Option<MessageRef>,
}

/// Result of a successful [`ApprovalGate::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Outcome of the decision (a resumed run may suspend again).
    pub outcome: OrchestratorOutcome,
    /// Thread the run reports to.
    pub thread: ThreadRef,
    /// The card that carried the decided request.
    pub card: Option<MessageRef>,
    /// The decided mutation.
    pub request: MutationRequest,
}

/// Concurrency-safe registry of suspended runs.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct ApprovalGate {
    entries: Arc<Mutex<HashMap<String, PendingApproval>>>,
    pump: Arc<EventPump>,
}

impl ApprovalGate {
    /// Create an empty gate that resumes approved runs with `pump`.
    #[must_use]
    pub fn new(pump: EventPump) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            pump: Arc::new(pump),
        }
    }

    /// Event pump shared with the orchestrator.
    #[must_use]
    pub fn pump(&self) -> &EventPump {
        &self.pump
    }

    /// Park a run, taking ownership of its agent handle.
    ///
    /// Returns the new approval identifier.
    pub async fn submit(
        &self,
        request: MutationRequest,
        handle: AgentHandle,
        context: RunContext,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        info!(
            approval_id = %id,
            user_id = %context.user_id,
            file = %request.file_path,
            kind = ?request.kind,
            "approval requested"
        );
        let entry = PendingApproval {
            id: id.clone(),
            request,
            context,
            card: None,
            created_at: Instant::now(),
            handle,
        };
        self.entries.lock().await.insert(id.clone(), entry);
        id
    }

    /// Remember where the approval card for `id` was posted.
    ///
    /// Returns `false` if the entry is already gone.
    pub async fn attach_card(&self, id: &str, card: MessageRef) -> bool {
        match self.entries.lock().await.get_mut(id) {
            Some(entry) => {
                entry.card = Some(card);
                true
            }
            None => false,
        }
    }

    /// Snapshot of a pending entry without claiming it.
    pub async fn view(&self, id: &str) -> Option<ApprovalView> {
        self.entries.lock().await.get(id).map(|entry| ApprovalView {
            id: entry.id.clone(),
            user_id: entry.context.user_id.clone(),
            thread: entry.context.thread.clone(),
            request: entry.request.clone(),
            card: entry.card.clone(),
        })
    }

    /// Whether `id` is still pending.
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.lock().await.contains_key(id)
    }

    /// Number of entries owned by `user_id`.
    pub async fn pending_for(&self, user_id: &str) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.context.user_id == user_id)
            .count()
    }

    /// Atomically remove `id` on behalf of `requester`.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if the entry was never registered or has
    ///   already been resolved or expired.
    /// - `AppError::Unauthorized` if `requester` does not own the run; the
    ///   entry stays pending.
    pub async fn claim(&self, id: &str, requester: &str) -> Result<PendingApproval> {
        let mut entries = self.entries.lock().await;
        let owner = entries
            .get(id)
            .map(|entry| entry.context.user_id.as_str())
            .ok_or_else(|| AppError::NotFound(format!("approval {id} not found")))?;
        if owner != requester {
            return Err(AppError::Unauthorized(
                "only the requesting user may decide this change".into(),
            ));
        }
        entries
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("approval {id} not found")))
    }

    /// Apply `decision` to the entry `id`.
    ///
    /// Approve resumes the same agent and drives it to the next outcome,
    /// which may be another [`OrchestratorOutcome::AwaitingApproval`].
    /// Reject terminates the agent and yields
    /// [`OrchestratorOutcome::Rejected`]; a failure to terminate is logged,
    /// not returned.
    ///
    /// # Errors
    ///
    /// Same as [`claim`](Self::claim). On error nothing is terminated.
    pub async fn resolve(
        &self,
        id: &str,
        decision: Decision,
        requester: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Resolution> {
        let PendingApproval {
            request,
            context,
            card,
            mut handle,
            ..
        } = self.claim(id, requester).await?;

        let thread = context.thread.clone();
        let span = info_span!("resolve", approval_id = %id, user_id = %requester, ?decision);

        let outcome = match decision {
            Decision::Approve => {
                info!(approval_id = %id, file = %request.file_path, "change approved; resuming agent");
                self.pump
                    .drive(self, handle, context, sink)
                    .instrument(span)
                    .await
            }
            Decision::Reject => {
                span.in_scope(|| {
                    info!(approval_id = %id, file = %request.file_path, "change rejected; stopping agent");
                });
                handle.terminate_quietly().await;
                OrchestratorOutcome::Rejected
            }
        };

        Ok(Resolution {
            outcome,
            thread,
            card,
            request,
        })
    }

    /// Remove every entry older than `threshold` and terminate its agent.
    ///
    /// Age is measured on the monotonic clock; an entry exactly `threshold`
    /// old is kept.
    pub async fn expire(&self, threshold: Duration) -> Vec<ExpiredApproval> {
        self.discard_where(|entry| entry.created_at.elapsed() > threshold)
            .await
    }

    /// Remove every entry and terminate its agent (shutdown).
    pub async fn drain(&self) -> Vec<ExpiredApproval> {
        self.discard_where(|_| true).await
    }

    async fn discard_where(
        &self,
        predicate: impl Fn(&PendingApproval) -> bool,
    ) -> Vec<ExpiredApproval> {
        let removed: Vec<PendingApproval> = {
            let mut entries = self.entries.lock().await;
            let ids: Vec<String> = entries
                .values()
                .filter(|entry| predicate(entry))
                .map(|entry| entry.id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        let mut discarded = Vec::with_capacity(removed.len());
        for mut entry in removed {
            if let Err(err) = entry.handle.terminate().await {
                warn!(approval_id = %entry.id, %err, "failed to terminate expired agent");
            }
            info!(approval_id = %entry.id, user_id = %entry.context.user_id, "approval expired");
            discarded.push(ExpiredApproval {
                id: entry.id,
                user_id: entry.context.user_id,
                thread: entry.context.thread,
                file_path: entry.request.file_path,
                card: entry.card,
            });
        }
        discarded
    }
}
