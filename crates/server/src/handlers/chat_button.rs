use std::sync::Arc;

use async_trait::async_trait;
use eli5_core::conversation::ModalMetadata;
use eli5_slack::{
    api::{OutgoingMessage, SlackApi},
    blocks::{dm_intro_text, DmOrigin},
    events::{
        EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent,
        SlackEventType, CHAT_ABOUT_THIS_ACTION,
    },
};
use tracing::info;

/// "Chat about this" in the explanation modal moves the conversation to a DM.
pub struct ChatButtonHandler {
    slack: Arc<dyn SlackApi>,
}

impl ChatButtonHandler {
    pub fn new(slack: Arc<dyn SlackApi>) -> Self {
        Self { slack }
    }
}

#[async_trait]
impl EventHandler for ChatButtonHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(action) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if action.action_id != CHAT_ABOUT_THIS_ACTION || action.user_id.is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        let metadata = action
            .view
            .as_ref()
            .map(|view| ModalMetadata::decode(&view.private_metadata))
            .unwrap_or_default();

        let channel = self.slack.open_dm(&action.user_id).await?;
        self.slack
            .post_message(OutgoingMessage::text(
                channel,
                dm_intro_text(DmOrigin::ChatButton, &metadata.original_text),
            ))
            .await?;

        info!(
            event_name = "server.chat_button.dm_started",
            correlation_id = %ctx.correlation_id,
            user_id = %action.user_id,
            "dm conversation started from modal"
        );
        Ok(HandlerResult::Processed)
    }
}
