use async_trait::async_trait;
use eli5_agent::conversation::history_to_turns;
use eli5_core::errors::{ApplicationError, FailureNotice};
use eli5_slack::{
    api::{HistoryQuery, OutgoingMessage},
    blocks::linked_message_reply,
    events::{
        EventContext, EventHandler, EventHandlerError, HandlerResult, MessageEvent,
        SlackEnvelope, SlackEvent, SlackEventType,
    },
    extract::{message_text, parse_message_link},
};
use tracing::{error, warn};

use super::HandlerDeps;

const HISTORY_LIMIT: u32 = 10;

/// Conversations in the bot's DM channel.
///
/// A pasted Slack message link gets that message explained; anything else is
/// answered with the recent DM history as context.
pub struct DirectMessageHandler {
    deps: HandlerDeps,
}

impl DirectMessageHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }

    async fn explain_linked(
        &self,
        channel: &str,
        ts: &str,
        ctx: &EventContext,
    ) -> Result<String, ApplicationError> {
        let history = match self
            .deps
            .slack
            .conversation_history(HistoryQuery::single(channel, ts))
            .await
        {
            Ok(history) => history,
            Err(fetch_error) => {
                warn!(
                    event_name = "server.dm.linked_fetch_failed",
                    correlation_id = %ctx.correlation_id,
                    channel_id = channel,
                    error = %fetch_error,
                    "linked message could not be fetched"
                );
                return Ok(FailureNotice::LinkedMessageUnavailable.user_message().to_owned());
            }
        };

        let linked_text = history.first().map(message_text).unwrap_or_default();
        if linked_text.is_empty() {
            return Ok(FailureNotice::LinkedMessageUnavailable.user_message().to_owned());
        }

        let explanation = self.deps.explainer.explain(&linked_text, &[]).await?;
        Ok(linked_message_reply(&linked_text, &explanation))
    }

    async fn converse(&self, message: &MessageEvent, text: &str) -> Result<String, ApplicationError> {
        let history = self
            .deps
            .slack
            .conversation_history(HistoryQuery::recent(&message.channel_id, HISTORY_LIMIT))
            .await
            .map_err(|error| ApplicationError::Slack(error.to_string()))?;

        let turns = history_to_turns(&history, text);
        Ok(self.deps.explainer.chat(&turns).await?)
    }
}

#[async_trait]
impl EventHandler for DirectMessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let text = message.text.trim();
        if !message.is_direct_message() || text.is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        let reply = match parse_message_link(text) {
            Some((channel, ts)) => self.explain_linked(&channel, &ts, ctx).await,
            None => self.converse(message, text).await,
        };

        let reply = reply.unwrap_or_else(|failure| {
            error!(
                event_name = "server.dm.reply_failed",
                correlation_id = %ctx.correlation_id,
                channel_id = %message.channel_id,
                error = %failure,
                "dm reply failed"
            );
            failure.conversation_notice().user_message().to_owned()
        });

        self.deps.slack.post_message(OutgoingMessage::text(&message.channel_id, reply)).await?;
        Ok(HandlerResult::Processed)
    }
}
