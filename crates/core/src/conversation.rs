//! Follow-up conversation state that rides along in a modal's `private_metadata`.
//!
//! Slack caps `private_metadata` at 3000 characters, so [`ModalMetadata::encode`]
//! keeps the JSON under [`MAX_METADATA_CHARS`] by forgetting the oldest turns
//! first and only then shortening the stored explanation.

use serde::{Deserialize, Serialize};

pub const MAX_METADATA_CHARS: usize = 2900;
pub const MAX_ORIGINAL_TEXT_CHARS: usize = 800;
pub const PREVIEW_CHARS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalMetadata {
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
}

impl ModalMetadata {
    pub fn new(
        original_text: &str,
        explanation: impl Into<String>,
        conversation: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            original_text: truncate_chars(original_text, MAX_ORIGINAL_TEXT_CHARS).to_string(),
            explanation: explanation.into(),
            conversation,
        }
    }

    /// Serializes into a string that always fits in `private_metadata`.
    pub fn encode(&self) -> String {
        let mut data = self.clone();
        data.original_text =
            truncate_chars(&data.original_text, MAX_ORIGINAL_TEXT_CHARS).to_string();

        let mut encoded = to_json(&data);
        while char_len(&encoded) > MAX_METADATA_CHARS && !data.conversation.is_empty() {
            data.conversation.remove(0);
            encoded = to_json(&data);
        }

        if char_len(&encoded) > MAX_METADATA_CHARS {
            // JSON escaping can make the encoded form longer than the raw text,
            // so shrink until the serialized size fits.
            let overflow = char_len(&encoded) - MAX_METADATA_CHARS;
            let mut keep = char_len(&data.explanation).saturating_sub(overflow);
            loop {
                data.explanation = truncate_chars(&data.explanation, keep).to_string();
                encoded = to_json(&data);
                if char_len(&encoded) <= MAX_METADATA_CHARS || keep == 0 {
                    break;
                }
                keep = keep.saturating_sub((char_len(&encoded) - MAX_METADATA_CHARS).max(1));
            }
        }

        encoded
    }

    /// Missing or garbled metadata decodes to an empty record.
    pub fn decode(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_default()
    }

    pub fn with_turns(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.conversation.push(ConversationTurn::user(question));
        self.conversation.push(ConversationTurn::assistant(answer));
        self
    }
}

fn to_json(data: &ModalMetadata) -> String {
    serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string())
}

/// First 500 characters of `text`, with `...` appended when it was cut.
pub fn preview(text: &str) -> String {
    if char_len(text) > PREVIEW_CHARS {
        format!("{}...", truncate_chars(text, PREVIEW_CHARS))
    } else {
        text.to_string()
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
