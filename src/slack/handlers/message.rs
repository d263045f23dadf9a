//! Chat message handler: every human message in a channel or DM the bot can
//! see becomes a prompt.

use std::sync::Arc;

use slack_morphism::prelude::SlackMessageEvent;
use tracing::{debug, info};

use crate::dispatch::{self, InboundMessage};
use crate::models::thread::ThreadRef;
use crate::state::AppState;

/// Extract a prompt from a message event.
///
/// Returns `None` for bot messages, edits, joins and other subtyped events,
/// and messages without text.
#[must_use]
pub fn parse_message(event: &SlackMessageEvent) -> Option<InboundMessage> {
    if event.sender.bot_id.is_some() || event.subtype.is_some() {
        return None;
    }
    let user_id = event.sender.user.as_ref()?.to_string();
    let channel = event.origin.channel.as_ref()?.to_string();
    let text = event
        .content
        .as_ref()
        .and_then(|content| content.text.clone())
        .filter(|text| !text.trim().is_empty())?;

    // Replies go into the thread of the triggering message.
    let thread_ts = event
        .origin
        .thread_ts
        .as_ref()
        .unwrap_or(&event.origin.ts)
        .to_string();

    Some(InboundMessage {
        user_id,
        thread: ThreadRef::new(channel, Some(thread_ts)),
        text,
    })
}

/// Start an agent run for `event` on a background task.
pub fn handle_message_event(event: &SlackMessageEvent, state: &Arc<AppState>) {
    let Some(inbound) = parse_message(event) else {
        debug!("ignoring non-prompt message event");
        return;
    };
    info!(user_id = %inbound.user_id, channel = %inbound.thread.channel, "prompt received");

    let state = Arc::clone(state);
    tokio::spawn(async move {
        dispatch::handle_message(&state, inbound).await;
    });
}
