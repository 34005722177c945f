//! Slack integration for the ELI5 bot
//!
//! This crate owns everything that speaks Slack:
//! - **Events** (`events`) - Events API and interactivity payloads, plus the dispatcher
//! - **Signature** (`signature`) - `X-Slack-Signature` verification and internal request signing
//! - **Block Kit** (`blocks`) - explanation messages, modals and the App Home view
//! - **Web API** (`api`) - `chat.*`, `views.*` and `conversations.*` calls
//! - **Extraction** (`extract`) - text, linked pages and images pulled out of a message
//!
//! # Architecture
//!
//! ```text
//! HTTP body → signature check → parse_request → EventDispatcher
//!                                                 ├─ acknowledge (inline, < 3s)
//!                                                 └─ handle (deferred) → SlackApi
//! ```

pub mod api;
pub mod blocks;
pub mod events;
pub mod extract;
pub mod signature;

pub use api::{HistoryQuery, OutgoingMessage, SlackApi, SlackApiError, SlackWebClient};
pub use events::{
    AckResponse, EventContext, EventDispatcher, EventHandler, EventHandlerError, HandlerResult,
    SlackEnvelope, SlackEvent, SlackEventType,
};
pub use signature::{SignatureError, SignatureVerifier};
