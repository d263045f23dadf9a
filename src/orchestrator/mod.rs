//! Agent run orchestration.
//!
//! - [`runner`]: launch an agent and drive it to its first outcome.
//! - [`drive`]: the event pump shared with approval resumption.
//! - [`reaper`]: background expiry of stale approvals.
//! - [`in_flight`]: one active run per user.

pub mod drive;
pub mod in_flight;
pub mod reaper;
pub mod runner;

pub use drive::{EventPump, RunContext};
pub use in_flight::{InFlight, InFlightGuard};
pub use runner::{Orchestrator, RunRequest};
