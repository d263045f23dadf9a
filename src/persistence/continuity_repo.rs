//! Conversation continuity repository for `SQLite` persistence.
//!
//! One row per user: the working directory, the agent's resume token and a
//! human-facing label. Rows are read once at the start of a run and written
//! when a run completes or the user changes settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::models::continuity::Continuity;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for per-user continuity records.
#[derive(Clone)]
pub struct ContinuityRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ConversationRow {
    user_id: String,
    label: String,
    workspace_root: String,
    resume_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn into_continuity(self) -> Result<Continuity> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let updated_at = chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Continuity {
            user_id: self.user_id,
            label: self.label,
            workspace_root: PathBuf::from(self.workspace_root),
            resume_id: self.resume_id,
            created_at,
            updated_at,
        })
    }
}

impl ContinuityRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch the record for `user_id`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is corrupt.
    pub async fn get(&self, user_id: &str) -> Result<Option<Continuity>> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT user_id, label, workspace_root, resume_id, created_at, updated_at
             FROM conversation
             WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(ConversationRow::into_continuity).transpose()
    }

    /// Fetch the record for `user_id`, creating a fresh one rooted at
    /// `default_root` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert or query fails.
    pub async fn get_or_create(&self, user_id: &str, default_root: &Path) -> Result<Continuity> {
        let fresh = Continuity::new(user_id.to_owned(), default_root.to_path_buf());
        self.insert_if_absent(&fresh).await?;
        self.get(user_id)
            .await?
            .ok_or_else(|| AppError::Db("failed to create conversation".into()))
    }

    /// Record the resume token reported by a completed run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the user has no record, or
    /// `AppError::Db` if the update fails.
    pub async fn update_resume_id(&self, user_id: &str, resume_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE conversation SET resume_id = ?1, updated_at = ?2 WHERE user_id = ?3",
        )
        .bind(resume_id)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "no conversation for user {user_id}"
            )));
        }
        Ok(())
    }

    /// Point the user's agent at another working directory.
    ///
    /// The resume token is kept; the agent decides whether it still applies.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn set_workspace(&self, user_id: &str, root: &Path) -> Result<Continuity> {
        let mut current = self.get_or_create(user_id, root).await?;
        current.workspace_root = root.to_path_buf();
        current.updated_at = Utc::now();

        sqlx::query(
            "UPDATE conversation SET workspace_root = ?1, updated_at = ?2 WHERE user_id = ?3",
        )
        .bind(current.workspace_root.to_string_lossy().into_owned())
        .bind(current.updated_at.to_rfc3339())
        .bind(user_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(current)
    }

    /// Start a new conversation rooted at `root`: fresh label, no resume
    /// token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn reset(&self, user_id: &str, root: &Path) -> Result<Continuity> {
        let fresh = Continuity::new(user_id.to_owned(), root.to_path_buf());

        sqlx::query(
            "INSERT INTO conversation (user_id, label, workspace_root, resume_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 label = excluded.label,
                 workspace_root = excluded.workspace_root,
                 resume_id = NULL,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&fresh.user_id)
        .bind(&fresh.label)
        .bind(fresh.workspace_root.to_string_lossy().into_owned())
        .bind(fresh.created_at.to_rfc3339())
        .bind(fresh.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(fresh)
    }

    async fn insert_if_absent(&self, record: &Continuity) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO conversation (user_id, label, workspace_root, resume_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.user_id)
        .bind(&record.label)
        .bind(record.workspace_root.to_string_lossy().into_owned())
        .bind(&record.resume_id)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }
}
