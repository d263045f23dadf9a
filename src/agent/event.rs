//! Typed events decoded from the agent's `stream-json` output.
//!
//! Each stdout line is one JSON object discriminated by `type`. A single
//! `assistant` line may carry several content blocks; every block becomes
//! its own [`Event`] so downstream consumers see one action per event.
//!
//! | Wire `type`   | Maps to                                   |
//! |---------------|-------------------------------------------|
//! | `system`      | [`Event::Init`]                           |
//! | `assistant`   | [`Event::Text`] / [`Event::ToolUse`]      |
//! | `result`      | [`Event::Completion`] / [`Event::Failure`]|
//! | *(any other)* | nothing; logged at `DEBUG`                |

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{AppError, Result};

/// One decoded unit of agent output, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The agent loaded its context.
    Init {
        /// Conversation id announced by the agent.
        session_id: Option<String>,
    },
    /// Free-form assistant text.
    Text {
        /// The text block.
        text: String,
    },
    /// The agent invoked a tool.
    ToolUse {
        /// Correlation id of the tool call.
        id: Option<String>,
        /// Tool name (`Read`, `Edit`, `Write`, `Bash`, …).
        name: String,
        /// Tool arguments.
        input: Value,
    },
    /// The agent finished successfully.
    Completion {
        /// Final answer text.
        text: String,
        /// Continuity id to resume this conversation later.
        session_id: Option<String>,
    },
    /// The agent reported a failure.
    Failure {
        /// Failure description.
        message: String,
    },
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    System {
        session_id: Option<String>,
    },
    Assistant {
        message: WireAssistant,
    },
    Result {
        subtype: Option<String>,
        #[serde(default)]
        is_error: bool,
        result: Option<String>,
        session_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireAssistant {
    #[serde(default)]
    content: Vec<WireBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse one stdout line into zero or more [`Event`]s.
///
/// Blank lines and well-formed messages of an uninteresting `type` yield an
/// empty vector.
///
/// # Errors
///
/// Returns [`AppError::Stream`]`("malformed json: …")` when the line is not a
/// JSON object of a recognizable shape.
pub fn parse_line(line: &str) -> Result<Vec<Event>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let message: WireMessage =
        serde_json::from_str(line).map_err(|e| AppError::Stream(format!("malformed json: {e}")))?;

    let events = match message {
        WireMessage::System { session_id } => vec![Event::Init { session_id }],
        WireMessage::Assistant { message } => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                WireBlock::Text { text } => Some(Event::Text { text }),
                WireBlock::ToolUse { id, name, input } => Some(Event::ToolUse { id, name, input }),
                WireBlock::Other => None,
            })
            .collect(),
        WireMessage::Result {
            subtype,
            is_error,
            result,
            session_id,
        } => {
            let failed = is_error
                || subtype
                    .as_deref()
                    .is_some_and(|s| s.starts_with("error"));
            if failed {
                let message = result
                    .filter(|r| !r.trim().is_empty())
                    .or(subtype)
                    .unwrap_or_else(|| "agent reported an error".to_owned());
                vec![Event::Failure { message }]
            } else {
                vec![Event::Completion {
                    text: result.unwrap_or_default(),
                    session_id,
                }]
            }
        }
        WireMessage::Other => {
            debug!("agent stream: skipping message of unhandled type");
            Vec::new()
        }
    };

    Ok(events)
}
