use async_trait::async_trait;
use eli5_slack::events::{
    EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent,
    SlackEventType,
};
use tracing::info;

pub struct ViewClosedHandler;

#[async_trait]
impl EventHandler for ViewClosedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewClosed
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewClosed(closed) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "server.view.closed",
            correlation_id = %ctx.correlation_id,
            callback_id = %closed.callback_id,
            user_id = %closed.user_id,
            view_id = %closed.view_id,
            "modal closed"
        );
        Ok(HandlerResult::Processed)
    }
}
