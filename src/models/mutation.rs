//! File mutation requests raised by the agent.

use serde::{Deserialize, Serialize};

/// Whether the agent wants to create a file or change an existing one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Write a new file; there is no prior content.
    Create,
    /// Replace text inside an existing file.
    Modify,
}

/// A file mutation the agent asked to perform.
///
/// Never persisted; lives only while the request is in flight or parked in
/// the approval gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    /// Create or modify.
    pub kind: MutationKind,
    /// Target path as reported by the agent.
    pub file_path: String,
    /// Text being replaced; always empty for [`MutationKind::Create`].
    pub prior: String,
    /// Replacement text or full new file content.
    pub proposed: String,
}

impl MutationRequest {
    /// Build a request to create a new file.
    #[must_use]
    pub fn create(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Create,
            file_path: file_path.into(),
            prior: String::new(),
            proposed: content.into(),
        }
    }

    /// Build a request to modify an existing file.
    #[must_use]
    pub fn modify(
        file_path: impl Into<String>,
        prior: impl Into<String>,
        proposed: impl Into<String>,
    ) -> Self {
        Self {
            kind: MutationKind::Modify,
            file_path: file_path.into(),
            prior: prior.into(),
            proposed: proposed.into(),
        }
    }

    /// Last path component, used for compact display.
    #[must_use]
    pub fn file_name(&self) -> &str {
        file_name(&self.file_path)
    }
}

/// Last `/`-separated component of `path`, or the whole string.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
