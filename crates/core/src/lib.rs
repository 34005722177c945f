pub mod config;
pub mod conversation;
pub mod errors;

pub use config::{AppConfig, ConfigError, DispatchMode, LlmProvider, LoadOptions};
pub use conversation::{preview, ConversationTurn, ModalMetadata, Role};
pub use errors::{ApplicationError, FailureNotice};
