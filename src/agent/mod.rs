//! Agent process integration.
//!
//! - [`event`]: typed events parsed from `stream-json` lines.
//! - [`codec`]: line framing and tolerant decoding of the stdout stream.
//! - [`classify`]: pure mapping from events to orchestrator actions.
//! - [`process`]: the owned handle to a running agent.
//! - [`spawner`]: launching the CLI with a sanitized environment.

pub mod classify;
pub mod codec;
pub mod event;
pub mod process;
pub mod spawner;

pub use classify::{classify, Action};
pub use event::Event;
pub use process::{AgentHandle, ExitReport, ProcessControl};
pub use spawner::{AgentLauncher, CliLauncher, LaunchRequest, SpawnConfig};
