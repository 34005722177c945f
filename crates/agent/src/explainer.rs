use std::sync::Arc;

use eli5_core::{
    config::LlmProvider,
    conversation::{ConversationTurn, ModalMetadata, Role},
    errors::{ApplicationError, FailureNotice},
};
use eli5_slack::extract::ImageAttachment;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    llm::{ChatMessage, CompletionRequest, LlmClient, LlmError, MessageContent},
    prompts::Prompts,
};

pub const EXPLAIN_TEMPERATURE: f32 = 0.3;
pub const EXPLAIN_MAX_TOKENS: u32 = 2048;
pub const CHAT_TEMPERATURE: f32 = 0.4;
pub const CHAT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] tera::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl From<ExplainError> for ApplicationError {
    fn from(value: ExplainError) -> Self {
        Self::Llm(value.to_string())
    }
}

/// Turns Slack content into explanations and conversation replies.
pub struct Explainer {
    client: Option<Arc<dyn LlmClient>>,
    prompts: Prompts,
}

impl Explainer {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Result<Self, ExplainError> {
        Ok(Self { client, prompts: Prompts::new()? })
    }

    pub fn provider(&self) -> LlmProvider {
        self.client.as_ref().map(|client| client.provider()).unwrap_or(LlmProvider::Unconfigured)
    }

    /// Explains `text`. Images go along when present; if the multimodal
    /// request fails the explanation is retried from the text alone.
    pub async fn explain(
        &self,
        text: &str,
        images: &[ImageAttachment],
    ) -> Result<String, ExplainError> {
        let Some(client) = &self.client else {
            return Ok(FailureNotice::NoProvider.user_message().to_owned());
        };

        let system = self.prompts.explain_system()?;
        let prompt = self.prompts.explain_user(text)?;

        if !images.is_empty() {
            let request = explain_request(
                &system,
                MessageContent::Parts { images: images.to_vec(), text: prompt.clone() },
            );
            match client.complete(&request).await {
                Ok(explanation) => return Ok(explanation),
                Err(error) => warn!(
                    event_name = "agent.explain.image_fallback",
                    provider = client.provider().as_str(),
                    image_count = images.len(),
                    error = %error,
                    "multimodal explanation failed, retrying with text only"
                ),
            }
        }

        let request = explain_request(&system, MessageContent::Text(prompt));
        let explanation = client.complete(&request).await?;
        info!(
            event_name = "agent.explain.completed",
            provider = client.provider().as_str(),
            chars = explanation.len(),
            "explanation generated"
        );
        Ok(explanation)
    }

    /// Replies to a conversation that ends with the user's latest message.
    pub async fn chat(&self, turns: &[ConversationTurn]) -> Result<String, ExplainError> {
        let Some(client) = &self.client else {
            return Ok(FailureNotice::NoProvider.user_message().to_owned());
        };

        let request = CompletionRequest {
            system: self.prompts.chat_system()?,
            messages: turns
                .iter()
                .map(|turn| ChatMessage::text(turn.role, turn.content.clone()))
                .collect(),
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        };
        Ok(client.complete(&request).await?)
    }

    /// Answers a question asked in the explanation modal, with the original
    /// message, its explanation and earlier Q&A as context.
    pub async fn follow_up(
        &self,
        metadata: &ModalMetadata,
        question: &str,
    ) -> Result<String, ExplainError> {
        let turns = self.follow_up_turns(metadata, question)?;
        self.chat(&turns).await
    }

    fn follow_up_turns(
        &self,
        metadata: &ModalMetadata,
        question: &str,
    ) -> Result<Vec<ConversationTurn>, ExplainError> {
        let mut turns = Vec::with_capacity(metadata.conversation.len() + 3);
        if !metadata.original_text.is_empty() {
            turns.push(ConversationTurn::user(self.prompts.followup_seed(&metadata.original_text)?));
        }
        if !metadata.explanation.is_empty() {
            turns.push(ConversationTurn::assistant(metadata.explanation.clone()));
        }
        turns.extend(metadata.conversation.iter().cloned());
        turns.push(ConversationTurn { role: Role::User, content: question.to_owned() });
        Ok(turns)
    }
}

fn explain_request(system: &str, content: MessageContent) -> CompletionRequest {
    CompletionRequest {
        system: system.to_owned(),
        messages: vec![ChatMessage { role: Role::User, content }],
        temperature: EXPLAIN_TEMPERATURE,
        max_tokens: EXPLAIN_MAX_TOKENS,
    }
}
