//! Slack Socket Mode client and [`ChatSurface`] implementation.

use std::sync::Arc;
use std::time::Duration;

use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::{
    SlackApiChatPostEphemeralRequest, SlackApiChatPostMessageRequest, SlackApiChatUpdateRequest,
    SlackApiToken, SlackApiTokenType, SlackApiTokenValue, SlackBlock, SlackChannelId, SlackClient,
    SlackClientEventsListenerEnvironment, SlackClientHyperHttpsConnector, SlackClientSession,
    SlackClientSocketModeConfig, SlackClientSocketModeListener, SlackMessageContent,
    SlackSocketModeListenerCallbacks, SlackTs, SlackUserId,
};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info, warn};

use crate::models::thread::{MessageRef, ThreadRef};
use crate::slack::{blocks, commands, events};
use crate::state::AppState;
use crate::surface::{ChatSurface, Outbound, SurfaceFuture};
use crate::{config::SlackConfig, AppError, Result};

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const MAX_POST_ATTEMPTS: u32 = 4;

/// Slack Web API and Socket Mode wrapper.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
    app_token: SlackApiToken,
}

fn message_content(text: Option<String>, blocks: Option<Vec<SlackBlock>>) -> SlackMessageContent {
    SlackMessageContent {
        text,
        blocks,
        attachments: None,
        upload: None,
        files: None,
        reactions: None,
        metadata: None,
    }
}

/// Render an [`Outbound`] into Slack message content.
fn render(message: Outbound) -> SlackMessageContent {
    match message {
        Outbound::Text(text) => {
            let sections = blocks::text_sections(&text);
            message_content(Some(text), Some(sections))
        }
        Outbound::Approval {
            approval_id,
            request,
        } => message_content(
            Some(blocks::approval_fallback_text(&request)),
            Some(blocks::approval_blocks(&approval_id, &request)),
        ),
    }
}

/// Whether a failed Web API call may succeed when repeated.
#[must_use]
pub fn is_retryable(error: &SlackClientError) -> bool {
    matches!(
        error,
        SlackClientError::RateLimitError(_)
            | SlackClientError::HttpError(_)
            | SlackClientError::HttpProtocolError(_)
            | SlackClientError::EndOfStream(_)
    )
}

impl SlackService {
    /// Create the Slack client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created.
    pub fn start(config: &SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.bot_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::Bot),
        };
        let app_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.app_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::App),
        };

        info!("slack client initialized");
        Ok(Self {
            client,
            bot_token,
            app_token,
        })
    }

    /// Connect Socket Mode and dispatch inbound events against `state`.
    #[must_use]
    pub fn spawn_socket_mode(&self, state: Arc<AppState>) -> JoinHandle<()> {
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(state),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_command_events(commands::handle_command)
            .with_interaction_events(events::handle_interaction)
            .with_push_events(events::handle_push_event);
        let config = SlackClientSocketModeConfig {
            max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
            debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
            initial_backoff_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
            reconnect_timeout_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
            ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
            ping_failure_threshold_times:
                SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
        };

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        let app_token = self.app_token.clone();
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }

            listener.serve().await;
            info!("socket mode listener exited");
        })
    }

    /// Create an HTTP session for direct API calls using the bot token.
    #[must_use]
    pub fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    /// Post a message, retrying on rate limits and transport failures.
    ///
    /// API errors such as `invalid_blocks` fail on the first attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` once all attempts have failed.
    pub async fn post_message(
        &self,
        channel: SlackChannelId,
        thread_ts: Option<SlackTs>,
        content: SlackMessageContent,
    ) -> Result<SlackTs> {
        let mut request = SlackApiChatPostMessageRequest::new(channel, content);
        request.thread_ts = thread_ts;
        request.link_names = Some(true);

        let session = self.http_session();
        let mut backoff = INITIAL_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match session.chat_post_message(&request).await {
                Ok(response) => return Ok(response.ts),
                Err(error) if attempt < MAX_POST_ATTEMPTS && is_retryable(&error) => {
                    let delay = match &error {
                        SlackClientError::RateLimitError(rate) => {
                            rate.retry_after.unwrap_or(backoff)
                        }
                        _ => backoff,
                    };
                    warn!(?error, delay = ?delay, attempt, "slack post failed; retrying");
                    sleep(delay).await;
                    backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
                Err(error) => {
                    return Err(AppError::Slack(format!("failed to post message: {error}")));
                }
            }
        }
    }

    /// Replace the content of an existing message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the Slack API call fails.
    pub async fn update_message(
        &self,
        channel: SlackChannelId,
        ts: SlackTs,
        content: SlackMessageContent,
    ) -> Result<()> {
        let request = SlackApiChatUpdateRequest::new(channel, content, ts);
        self.http_session()
            .chat_update(&request)
            .await
            .map_err(|err| AppError::Slack(format!("failed to update message: {err}")))?;
        Ok(())
    }

    /// Post a message visible only to `user`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the Slack API call fails.
    pub async fn post_ephemeral(
        &self,
        channel: SlackChannelId,
        user: SlackUserId,
        thread_ts: Option<SlackTs>,
        text: &str,
    ) -> Result<()> {
        let mut request = SlackApiChatPostEphemeralRequest::new(
            channel,
            user,
            message_content(Some(text.to_owned()), None),
        );
        request.thread_ts = thread_ts;
        self.http_session()
            .chat_post_ephemeral(&request)
            .await
            .map_err(|err| AppError::Slack(format!("failed to post ephemeral: {err}")))?;
        Ok(())
    }
}

impl ChatSurface for SlackService {
    fn send<'a>(&'a self, thread: &'a ThreadRef, message: Outbound) -> SurfaceFuture<'a, MessageRef> {
        Box::pin(async move {
            let channel = SlackChannelId(thread.channel.clone());
            let thread_ts = thread.thread_ts.clone().map(SlackTs);
            let ts = self.post_message(channel, thread_ts, render(message)).await?;
            Ok(MessageRef {
                channel: thread.channel.clone(),
                ts: ts.0,
            })
        })
    }

    fn edit<'a>(&'a self, message: &'a MessageRef, content: Outbound) -> SurfaceFuture<'a, ()> {
        Box::pin(async move {
            self.update_message(
                SlackChannelId(message.channel.clone()),
                SlackTs(message.ts.clone()),
                render(content),
            )
            .await
        })
    }

    fn whisper<'a>(
        &'a self,
        thread: &'a ThreadRef,
        user_id: &'a str,
        text: &'a str,
    ) -> SurfaceFuture<'a, ()> {
        Box::pin(async move {
            self.post_ephemeral(
                SlackChannelId(thread.channel.clone()),
                SlackUserId(user_id.to_owned()),
                thread.thread_ts.clone().map(SlackTs),
                text,
            )
            .await
        })
    }
}
