//! Terminal and suspended results of an agent run.

use crate::models::mutation::MutationRequest;

/// The single value produced by an orchestrator run or an approval resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorOutcome {
    /// The agent finished and produced an answer.
    Completed {
        /// Final answer text.
        text: String,
        /// Continuity id reported by the agent, if any.
        resume_id: Option<String>,
    },
    /// The agent is parked in the approval gate waiting for a decision.
    AwaitingApproval {
        /// Gate identifier used to resolve the request.
        approval_id: String,
        /// The mutation awaiting review.
        request: MutationRequest,
    },
    /// The operator rejected the mutation and the agent was stopped.
    Rejected,
    /// The run failed; `reason` is a bounded diagnostic.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl OrchestratorOutcome {
    /// Build a `Failed` outcome from any displayable reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}
