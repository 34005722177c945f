//! Explanation engine - LLM clients, prompts and conversation shaping
//!
//! - **LLM clients** (`llm`) - OpenAI-compatible gateway and Anthropic Messages API
//!   behind the `LlmClient` trait, with bounded retry
//! - **Prompts** (`prompts`) - Tera templates for the system and user prompts
//! - **Explainer** (`explainer`) - explanations, DM chat replies and modal follow-ups
//! - **Conversation** (`conversation`) - DM history to chronological turns
//!
//! Provider selection follows the config: a gateway key wins, then an
//! Anthropic key. With neither, the explainer answers with a setup notice
//! instead of failing.

pub mod conversation;
pub mod explainer;
pub mod llm;
pub mod prompts;

pub use explainer::{ExplainError, Explainer};
pub use llm::{client_from_config, LlmClient, LlmError};
