//! Approval button handler.
//!
//! Parses Approve/Reject presses on an approval card and resolves the gate
//! entry named by the button value.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackBasicChannelInfo, SlackHistoryMessage, SlackInteractionActionInfo,
};
use tracing::info;

use crate::dispatch::{self, InboundDecision};
use crate::gate::Decision;
use crate::models::thread::MessageRef;
use crate::slack::blocks::{APPROVE_ACTION, REJECT_ACTION};
use crate::state::AppState;

/// Map a button action to a decision.
///
/// # Errors
///
/// Returns an error string for unknown actions or a missing approval id.
pub fn parse_decision(
    action: &SlackInteractionActionInfo,
    user_id: &str,
    channel: Option<&SlackBasicChannelInfo>,
    message: Option<&SlackHistoryMessage>,
) -> Result<InboundDecision, String> {
    let action_id = action.action_id.to_string();
    let decision = match action_id.as_str() {
        APPROVE_ACTION => Decision::Approve,
        REJECT_ACTION => Decision::Reject,
        other => return Err(format!("unknown approval action_id: {other}")),
    };
    let approval_id = action
        .value
        .clone()
        .ok_or_else(|| "approval action missing approval id value".to_owned())?;

    let origin = match (channel, message) {
        (Some(channel), Some(message)) => Some(MessageRef {
            channel: channel.id.to_string(),
            ts: message.origin.ts.to_string(),
        }),
        _ => None,
    };

    Ok(InboundDecision {
        approval_id,
        decision,
        user_id: user_id.to_owned(),
        origin,
    })
}

/// Process a single approval button action from Slack.
///
/// # Errors
///
/// Returns an error string if the action cannot be parsed.
pub fn handle_approval_action(
    action: &SlackInteractionActionInfo,
    user_id: &str,
    channel: Option<&SlackBasicChannelInfo>,
    message: Option<&SlackHistoryMessage>,
    state: &Arc<AppState>,
) -> Result<(), String> {
    let inbound = parse_decision(action, user_id, channel, message)?;
    info!(
        approval_id = %inbound.approval_id,
        decision = ?inbound.decision,
        user_id,
        "approval decision received"
    );

    let state = Arc::clone(state);
    tokio::spawn(async move {
        dispatch::handle_decision(&state, inbound).await;
    });
    Ok(())
}
