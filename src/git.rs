//! Git shell-outs: the branch summary shown next to a working directory
//! and the `/agent git` passthrough.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::surface::render_answer;
use crate::{AppError, Result};

/// Bound on each of the two commands behind [`git_info`].
pub const GIT_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on a user-issued git command.
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// `(branch)` or `(branch, N uncommitted)` for `dir`; empty outside a
/// repository or when git is unavailable.
pub async fn git_info(dir: &Path) -> String {
    let Some(branch) = query(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await else {
        return String::new();
    };
    let porcelain = query(dir, &["status", "--porcelain"])
        .await
        .unwrap_or_default();
    format_git_info(branch.trim(), &porcelain)
}

/// Summarise a branch name and `git status --porcelain` output.
#[must_use]
pub fn format_git_info(branch: &str, porcelain: &str) -> String {
    let changes = porcelain
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count();
    if changes > 0 {
        format!("({branch}, {changes} uncommitted)")
    } else {
        format!("({branch})")
    }
}

/// Markdown code span for `dir`, followed by its git summary when there is one.
pub async fn workspace_label(dir: &Path) -> String {
    let info = git_info(dir).await;
    if info.is_empty() {
        format!("`{}`", dir.display())
    } else {
        format!("`{}` {info}", dir.display())
    }
}

/// Run `git <args>` in `dir` and return its output as a code block.
///
/// Stdout wins over stderr; the text is redacted and bounded like an agent
/// answer.
///
/// # Errors
///
/// Returns `AppError::Timeout` once `limit` elapses and
/// `AppError::Process` if git cannot be started.
pub async fn run_git(dir: &Path, args: &[&str], limit: Duration) -> Result<String> {
    let output = tokio::time::timeout(limit, command(dir, args).output())
        .await
        .map_err(|_| AppError::Timeout("Command timed out.".into()))?
        .map_err(|err| AppError::Process(format!("failed to run git: {err}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if !stdout.trim().is_empty() {
        stdout
    } else if !stderr.trim().is_empty() {
        stderr
    } else {
        "(no output)".into()
    };
    Ok(format!("```\n{}\n```", render_answer(&text)))
}

async fn query(dir: &Path, args: &[&str]) -> Option<String> {
    match tokio::time::timeout(GIT_INFO_TIMEOUT, command(dir, args).output()).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(_)) => None,
        Ok(Err(err)) => {
            debug!(%err, "git unavailable");
            None
        }
        Err(_) => {
            debug!(dir = %dir.display(), "git query timed out");
            None
        }
    }
}

fn command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}
