//! Slack event dispatch.
//!
//! Receives interactive payloads (button presses) and push events (chat
//! messages) via Socket Mode. Applies a centralized authorization guard
//! before dispatching to the appropriate handler.
//!
//! ## Authorization
//!
//! Every interaction and message is checked against `authorized_user_ids`
//! before reaching any handler. Unauthorized attempts are silently ignored
//! from the Slack user's perspective but logged as security events.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackInteractionEvent, SlackPushEventCallback,
};
use tracing::{debug, info, warn};

use crate::slack::blocks::GATE_ACTION_PREFIX;
use crate::slack::handlers;
use crate::state::AppState;

/// Verify that the acting Slack user is in `authorized_user_ids`.
///
/// On failure, logs a security event and returns `false`.
fn is_authorized(user_id: &str, state: &AppState) -> bool {
    match state.config.ensure_authorized(user_id) {
        Ok(()) => true,
        Err(err) => {
            warn!(
                user_id,
                %err,
                "unauthorized user attempted slack interaction (silently ignored)"
            );
            false
        }
    }
}

async fn app_state(state: &SlackClientEventsUserState) -> Option<Arc<AppState>> {
    let guard = state.read().await;
    guard.get_user_state::<Arc<AppState>>().cloned()
}

/// Handle interactive payloads delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; handler errors are logged.
pub async fn handle_interaction(
    event: SlackInteractionEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackInteractionEvent::BlockActions(block_event) = &event else {
        debug!("unhandled interaction event type");
        return Ok(());
    };

    let user_id = block_event
        .user
        .as_ref()
        .map(|u| u.id.to_string())
        .unwrap_or_default();
    if user_id.is_empty() {
        warn!("block action with empty user ID; ignoring");
        return Ok(());
    }

    let Some(app) = app_state(&state).await else {
        warn!("app state not available; cannot process interaction");
        return Ok(());
    };

    if !is_authorized(&user_id, &app) {
        return Ok(());
    }

    for action in block_event.actions.iter().flatten() {
        let action_id = action.action_id.to_string();
        info!(action_id, user_id, "dispatching block action");

        if action_id.starts_with(GATE_ACTION_PREFIX) {
            if let Err(err) = handlers::approval::handle_approval_action(
                action,
                &user_id,
                block_event.channel.as_ref(),
                block_event.message.as_ref(),
                &app,
            ) {
                warn!(%err, action_id, "approval action failed");
            }
        } else {
            warn!(action_id, "unknown action_id prefix");
        }
    }
    Ok(())
}

/// Handle Events API push events delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; unsupported events are logged and acknowledged.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackEventCallbackBody::Message(message) = &event.event else {
        debug!("push event ignored");
        return Ok(());
    };

    let Some(app) = app_state(&state).await else {
        warn!("app state not available; cannot process message");
        return Ok(());
    };

    if let Some(user) = &message.sender.user {
        if message.sender.bot_id.is_none() && !is_authorized(&user.to_string(), &app) {
            return Ok(());
        }
    }

    handlers::message::handle_message_event(message, &app);
    Ok(())
}
