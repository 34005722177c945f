use async_trait::async_trait;
use eli5_core::{conversation::ModalMetadata, errors::ApplicationError};
use eli5_slack::{
    blocks::{explanation_modal, thinking_modal},
    events::{
        AckResponse, EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope,
        SlackEvent, SlackEventType, ViewSubmissionEvent, FOLLOWUP_BLOCK_ID, FOLLOWUP_CALLBACK,
    },
};
use tracing::error;

use super::HandlerDeps;

pub const EMPTY_QUESTION_ERROR: &str = "Please enter a question.";

/// Follow-up questions typed into the explanation modal.
///
/// The ack swaps the modal to a "thinking" view inline; the deferred half asks
/// the LLM and rewrites the modal with the grown conversation.
pub struct FollowUpHandler {
    deps: HandlerDeps,
}

impl FollowUpHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

fn submitted_question(envelope: &SlackEnvelope) -> Option<(&ViewSubmissionEvent, &str)> {
    let SlackEvent::ViewSubmission(submission) = &envelope.event else {
        return None;
    };
    if submission.callback_id != FOLLOWUP_CALLBACK {
        return None;
    }
    let question = submission.followup.as_deref().map(str::trim).unwrap_or_default();
    Some((submission, question))
}

#[async_trait]
impl EventHandler for FollowUpHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    fn acknowledge(&self, envelope: &SlackEnvelope) -> AckResponse {
        let Some((submission, question)) = submitted_question(envelope) else {
            return AckResponse::Empty;
        };
        if question.is_empty() {
            return AckResponse::view_error(FOLLOWUP_BLOCK_ID, EMPTY_QUESTION_ERROR);
        }
        let metadata = ModalMetadata::decode(&submission.private_metadata);
        AckResponse::UpdateView(thinking_modal(&metadata, question))
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some((submission, question)) = submitted_question(envelope) else {
            return Ok(HandlerResult::Ignored);
        };
        if question.is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        let metadata = ModalMetadata::decode(&submission.private_metadata);
        let answer = match self.deps.explainer.follow_up(&metadata, question).await {
            Ok(answer) => answer,
            Err(explain_error) => {
                error!(
                    event_name = "server.followup.failed",
                    correlation_id = %ctx.correlation_id,
                    error = %explain_error,
                    "follow-up answer failed"
                );
                ApplicationError::from(explain_error).conversation_notice().user_message().to_owned()
            }
        };

        let updated = metadata.with_turns(question, answer);
        self.deps.slack.update_view(&submission.view_id, &explanation_modal(&updated)).await?;
        Ok(HandlerResult::Processed)
    }
}
