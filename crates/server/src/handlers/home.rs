use std::sync::Arc;

use async_trait::async_trait;
use eli5_slack::{
    api::SlackApi,
    blocks::home_view,
    events::{
        EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent,
        SlackEventType,
    },
};

pub struct AppHomeHandler {
    slack: Arc<dyn SlackApi>,
}

impl AppHomeHandler {
    pub fn new(slack: Arc<dyn SlackApi>) -> Self {
        Self { slack }
    }
}

#[async_trait]
impl EventHandler for AppHomeHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppHomeOpened
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppHomeOpened { user_id } = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.slack.publish_view(user_id, &home_view()).await?;
        Ok(HandlerResult::Processed)
    }
}
