use std::sync::Arc;

use async_trait::async_trait;
use eli5_slack::{
    api::{HistoryQuery, OutgoingMessage, SlackApi},
    blocks::{dm_intro_text, DmOrigin},
    events::{
        EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent,
        SlackEventType,
    },
    extract::message_text,
};
use tracing::{debug, info};

/// Reacting to a message with one of the trigger emojis starts a DM about it.
pub struct ReactionHandler {
    slack: Arc<dyn SlackApi>,
    trigger_emojis: Vec<String>,
}

impl ReactionHandler {
    pub fn new(slack: Arc<dyn SlackApi>, trigger_emojis: Vec<String>) -> Self {
        Self { slack, trigger_emojis }
    }
}

#[async_trait]
impl EventHandler for ReactionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ReactionAdded
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ReactionAdded(reaction) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !self.trigger_emojis.iter().any(|emoji| emoji == &reaction.reaction) {
            return Ok(HandlerResult::Ignored);
        }
        if reaction.user_id.is_empty() || reaction.channel_id.is_empty() || reaction.message_ts.is_empty()
        {
            return Ok(HandlerResult::Ignored);
        }

        let history = self
            .slack
            .conversation_history(HistoryQuery::single(&reaction.channel_id, &reaction.message_ts))
            .await?;
        let original_text = history.first().map(message_text).unwrap_or_default();
        if original_text.is_empty() {
            debug!(
                event_name = "server.reaction.empty_message",
                correlation_id = %ctx.correlation_id,
                channel_id = %reaction.channel_id,
                "reacted message has no text"
            );
            return Ok(HandlerResult::Ignored);
        }

        let channel = self.slack.open_dm(&reaction.user_id).await?;
        self.slack
            .post_message(OutgoingMessage::text(
                channel,
                dm_intro_text(DmOrigin::Reaction, &original_text),
            ))
            .await?;

        info!(
            event_name = "server.reaction.dm_started",
            correlation_id = %ctx.correlation_id,
            reaction = %reaction.reaction,
            "dm conversation started from reaction"
        );
        Ok(HandlerResult::Processed)
    }
}
