//! Addresses of conversations and messages on the chat surface.

use serde::{Deserialize, Serialize};

/// A conversation thread where replies for one request are posted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ThreadRef {
    /// Channel (or DM) identifier.
    pub channel: String,
    /// Parent message timestamp; `None` posts at the channel top level.
    pub thread_ts: Option<String>,
}

impl ThreadRef {
    /// Address a thread inside `channel`.
    pub fn new(channel: impl Into<String>, thread_ts: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts,
        }
    }
}

/// A single posted message that can later be edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Channel holding the message.
    pub channel: String,
    /// Message timestamp.
    pub ts: String,
}
