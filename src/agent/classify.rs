//! Maps decoded [`Event`]s to the action the orchestrator takes next.
//!
//! Classification is a pure function: it never touches the process, the
//! approval gate or the store. Only the three file-mutation tools suspend a
//! run; everything else the agent does is surfaced as a short progress line.

use serde_json::Value;

use super::event::Event;
use crate::models::mutation::{file_name, MutationRequest};

/// Display width (in characters) of a progress line.
pub const PROGRESS_WIDTH: usize = 40;

/// Progress line shown when the agent reports that its context is loaded.
pub const LOADING_CONTEXT: &str = "Loading context...";

/// What the orchestrator should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Nothing to surface.
    Ignore,
    /// Forward a one-line summary to the progress sink.
    Progress(String),
    /// Suspend the run until a human decides on this change.
    Mutate(MutationRequest),
    /// The agent finished.
    Done {
        /// Final answer text (possibly empty).
        text: String,
        /// Continuity id for the next run.
        resume_id: Option<String>,
    },
    /// The agent failed.
    Error(String),
}

/// Classify a single event.
#[must_use]
pub fn classify(event: &Event) -> Action {
    match event {
        Event::Init { .. } => Action::Progress(LOADING_CONTEXT.to_owned()),
        Event::Text { .. } => Action::Ignore,
        Event::ToolUse { name, input, .. } => classify_tool(name, input),
        Event::Completion { text, session_id } => Action::Done {
            text: text.clone(),
            resume_id: session_id.clone(),
        },
        Event::Failure { message } => Action::Error(message.clone()),
    }
}

fn classify_tool(name: &str, input: &Value) -> Action {
    match name {
        "Edit" => Action::Mutate(MutationRequest::modify(
            str_arg(input, "file_path"),
            str_arg(input, "old_string"),
            str_arg(input, "new_string"),
        )),
        "MultiEdit" => {
            let (prior, proposed) = multi_edit_parts(input);
            Action::Mutate(MutationRequest::modify(
                str_arg(input, "file_path"),
                prior,
                proposed,
            ))
        }
        "Write" => Action::Mutate(MutationRequest::create(
            str_arg(input, "file_path"),
            str_arg(input, "content"),
        )),
        _ => Action::Progress(describe_tool(name, input)),
    }
}

/// One-line, width-limited summary of a non-mutating tool call.
#[must_use]
pub fn describe_tool(name: &str, input: &Value) -> String {
    let arg = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("?");
    let line = match name {
        "Read" => format!("Reading: {}", file_name(arg("file_path"))),
        "NotebookEdit" => format!("Editing: {}", file_name(arg("notebook_path"))),
        "Bash" => format!("Running: {}", arg("command")),
        "Glob" => format!("Searching: {}", arg("pattern")),
        "Grep" => format!("Grep: {}", arg("pattern")),
        "WebSearch" => format!("Searching web: {}", arg("query")),
        "WebFetch" => format!("Fetching: {}", arg("url")),
        "Task" => format!("Task: {}", arg("description")),
        other => other.to_owned(),
    };
    truncate_display(&line, PROGRESS_WIDTH)
}

/// Collapse whitespace runs and cut `text` to at most `width` characters,
/// ending in `...` when shortened.
#[must_use]
pub fn truncate_display(text: &str, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let keep = width.saturating_sub(3);
    let mut out: String = flat.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn str_arg(input: &Value, key: &str) -> String {
    input
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Join the hunks of a `MultiEdit` call into one before/after pair.
fn multi_edit_parts(input: &Value) -> (String, String) {
    let Some(edits) = input.get("edits").and_then(Value::as_array) else {
        return (String::new(), String::new());
    };
    let mut prior = Vec::with_capacity(edits.len());
    let mut proposed = Vec::with_capacity(edits.len());
    for edit in edits {
        prior.push(str_arg(edit, "old_string"));
        proposed.push(str_arg(edit, "new_string"));
    }
    (prior.join("\n...\n"), proposed.join("\n...\n"))
}
