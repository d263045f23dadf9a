//! Per-user conversation continuity record.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a user's next agent run resumes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Continuity {
    /// Owning Slack user ID.
    pub user_id: String,
    /// Human-facing session label, regenerated on reset.
    pub label: String,
    /// Working directory for the agent process.
    pub workspace_root: PathBuf,
    /// Token the agent uses to resume prior dialogue.
    pub resume_id: Option<String>,
    /// Creation timestamp of this conversation.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Continuity {
    /// Start a fresh conversation for `user_id` rooted at `workspace_root`.
    #[must_use]
    pub fn new(user_id: String, workspace_root: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            label: now.format("%Y%m%d%H%M%S").to_string(),
            workspace_root,
            resume_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
