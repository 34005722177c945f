use async_trait::async_trait;
use eli5_core::{
    conversation::ModalMetadata,
    errors::{ApplicationError, FailureNotice},
};
use eli5_slack::{
    api::{OutgoingMessage, SlackApi, SlackApiError},
    blocks::{explanation_message, explanation_modal, loading_modal, notice_modal},
    events::{
        EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent,
        SlackEventType, EXPLAIN_PRIVATE_CALLBACK, EXPLAIN_PUBLIC_CALLBACK,
    },
    extract::extract_message,
};
use tracing::{error, info, warn};

use super::HandlerDeps;

const POSTED_NOTICE: &str = ":white_check_mark: Explanation posted to the channel!";

/// Where the invoking user sees progress and results: the modal opened from
/// the shortcut trigger, or ephemeral messages in the channel when the
/// trigger could not open one.
enum Surface<'a> {
    Modal { view_id: String },
    Ephemeral { channel_id: &'a str, user_id: &'a str },
}

impl Surface<'_> {
    async fn notice(&self, slack: &dyn SlackApi, text: &str) -> Result<(), SlackApiError> {
        match self {
            Self::Modal { view_id } => slack.update_view(view_id, &notice_modal(text)).await,
            Self::Ephemeral { channel_id, user_id } => {
                slack.post_ephemeral(user_id, OutgoingMessage::text(*channel_id, text)).await
            }
        }
    }

    async fn explanation(
        &self,
        slack: &dyn SlackApi,
        metadata: &ModalMetadata,
    ) -> Result<(), SlackApiError> {
        match self {
            Self::Modal { view_id } => slack.update_view(view_id, &explanation_modal(metadata)).await,
            Self::Ephemeral { channel_id, user_id } => {
                let template = explanation_message(&metadata.original_text, &metadata.explanation);
                slack
                    .post_ephemeral(user_id, OutgoingMessage::from_template(*channel_id, template))
                    .await
            }
        }
    }
}

/// The "ELI5" message shortcuts: explain privately in a modal or publicly in
/// the message thread.
pub struct ExplainShortcutHandler {
    deps: HandlerDeps,
}

impl ExplainShortcutHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl EventHandler for ExplainShortcutHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::MessageShortcut
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::MessageShortcut(shortcut) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let public = match shortcut.callback_id.as_str() {
            EXPLAIN_PRIVATE_CALLBACK => false,
            EXPLAIN_PUBLIC_CALLBACK => true,
            _ => return Ok(HandlerResult::Ignored),
        };
        let slack = self.deps.slack.as_ref();

        // The trigger id is only valid for a few seconds, so the modal opens
        // before any slow work starts.
        let surface = match slack.open_view(&shortcut.trigger_id, &loading_modal()).await {
            Ok(view_id) => Surface::Modal { view_id },
            Err(open_error) => {
                warn!(
                    event_name = "server.shortcut.modal_unavailable",
                    correlation_id = %ctx.correlation_id,
                    error = %open_error,
                    "could not open the loading modal, replying ephemerally"
                );
                Surface::Ephemeral {
                    channel_id: shortcut.channel_id.as_str(),
                    user_id: shortcut.user_id.as_str(),
                }
            }
        };

        let content =
            extract_message(&shortcut.message, self.deps.fetcher.as_ref(), slack).await;
        if content.is_empty() {
            surface.notice(slack, FailureNotice::NothingToExplain.user_message()).await?;
            return Ok(HandlerResult::Processed);
        }

        let explanation = match self.deps.explainer.explain(&content.text, &content.images).await {
            Ok(explanation) => explanation,
            Err(explain_error) => {
                error!(
                    event_name = "server.shortcut.explain_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %explain_error,
                    "explanation failed"
                );
                let notice = ApplicationError::from(explain_error).explanation_notice();
                surface.notice(slack, notice.user_message()).await?;
                return Ok(HandlerResult::Processed);
            }
        };

        let metadata = ModalMetadata::new(content.text.as_str(), explanation.as_str(), Vec::new());
        if !public {
            surface.explanation(slack, &metadata).await?;
            return Ok(HandlerResult::Processed);
        }

        let message = OutgoingMessage::from_template(
            shortcut.channel_id.clone(),
            explanation_message(&content.text, &explanation),
        )
        .in_thread(shortcut.message.ts.clone());

        match slack.post_message(message).await {
            Ok(()) => {
                info!(
                    event_name = "server.shortcut.posted",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %shortcut.channel_id,
                    "explanation posted in thread"
                );
                if let Surface::Modal { .. } = surface {
                    surface.notice(slack, POSTED_NOTICE).await?;
                }
            }
            Err(post_error) if post_error.is_not_in_channel() => {
                warn!(
                    event_name = "server.shortcut.not_in_channel",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %shortcut.channel_id,
                    "bot is not in the channel, showing explanation privately"
                );
                surface.explanation(slack, &metadata).await?;
            }
            Err(post_error) => {
                error!(
                    event_name = "server.shortcut.post_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %post_error,
                    "posting the explanation failed"
                );
                surface.notice(slack, FailureNotice::ExplanationFailed.user_message()).await?;
            }
        }
        Ok(HandlerResult::Processed)
    }
}
