#![forbid(unsafe_code)]

//! Chat bridge for a headless coding agent with human approval of file
//! changes.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gate;
pub mod git;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod progress;
pub mod redact;
pub mod slack;
pub mod state;
pub mod surface;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
