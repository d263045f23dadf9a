//! Shared application state handed to every inbound handler.

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::gate::ApprovalGate;
use crate::orchestrator::{InFlight, Orchestrator};
use crate::persistence::continuity_repo::ContinuityRepo;
use crate::surface::ChatSurface;

/// Everything a handler needs to serve a chat message or decision.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Per-user conversation store.
    pub continuity: ContinuityRepo,
    /// Launches and drives agent runs.
    pub orchestrator: Orchestrator,
    /// Outbound message sink.
    pub surface: Arc<dyn ChatSurface>,
    /// Users with a run in progress.
    pub in_flight: InFlight,
}

impl AppState {
    /// The approval gate shared by the orchestrator and the reaper.
    #[must_use]
    pub fn gate(&self) -> &ApprovalGate {
        self.orchestrator.gate()
    }
}
