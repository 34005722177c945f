use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("slack api failure: {0}")]
    Slack(String),
    #[error("llm failure: {0}")]
    Llm(String),
    #[error("content extraction failure: {0}")]
    Extraction(String),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Text shown to a user in place of an answer when something went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureNotice {
    NothingToExplain,
    ExplanationFailed,
    ConversationFailed,
    LinkedMessageUnavailable,
    NoProvider,
}

impl FailureNotice {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NothingToExplain => "I couldn't find any text to explain in that message.",
            Self::ExplanationFailed => {
                "Sorry, I had trouble generating an explanation. Please try again."
            }
            Self::ConversationFailed => {
                "Sorry, I had trouble processing that. Could you try again?"
            }
            Self::LinkedMessageUnavailable => {
                "I couldn't fetch that message. I might not have access to that channel. Try copying the message text and sending it to me directly!"
            }
            Self::NoProvider => {
                "No AI provider configured. Set `AI_GATEWAY_API_KEY` (for Vercel AI Gateway) or `ANTHROPIC_API_KEY`."
            }
        }
    }
}

impl ApplicationError {
    /// The notice a user sees for this failure while explaining a message.
    pub fn explanation_notice(&self) -> FailureNotice {
        match self {
            Self::Configuration(_) => FailureNotice::NoProvider,
            Self::Slack(_) | Self::Llm(_) | Self::Extraction(_) | Self::Payload(_) => {
                FailureNotice::ExplanationFailed
            }
        }
    }

    /// The notice a user sees for this failure during a DM conversation.
    pub fn conversation_notice(&self) -> FailureNotice {
        match self {
            Self::Configuration(_) => FailureNotice::NoProvider,
            Self::Slack(_) | Self::Llm(_) | Self::Extraction(_) | Self::Payload(_) => {
                FailureNotice::ConversationFailed
            }
        }
    }
}
