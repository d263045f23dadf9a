//! Slack interaction handler sub-modules.
//!
//! Each handler turns a Slack payload into a platform-neutral inbound
//! value and hands it to [`crate::dispatch`] on a background task, so the
//! Socket Mode acknowledgement is never delayed by an agent run.

pub mod approval;
pub mod message;
