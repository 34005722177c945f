//! Event handlers registered on the dispatcher, one per Slack event type.

mod chat_button;
mod direct_message;
mod followup;
mod home;
mod reaction;
mod shortcut;
mod view_closed;

use std::sync::Arc;

use eli5_agent::Explainer;
use eli5_slack::{api::SlackApi, events::EventDispatcher, extract::UrlFetcher};

pub use chat_button::ChatButtonHandler;
pub use direct_message::DirectMessageHandler;
pub use followup::FollowUpHandler;
pub use home::AppHomeHandler;
pub use reaction::ReactionHandler;
pub use shortcut::ExplainShortcutHandler;
pub use view_closed::ViewClosedHandler;

/// Shared clients every handler borrows from.
#[derive(Clone)]
pub struct HandlerDeps {
    pub slack: Arc<dyn SlackApi>,
    pub fetcher: Arc<dyn UrlFetcher>,
    pub explainer: Arc<Explainer>,
}

pub fn build_dispatcher(deps: HandlerDeps, trigger_emojis: Vec<String>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ExplainShortcutHandler::new(deps.clone()));
    dispatcher.register(ChatButtonHandler::new(deps.slack.clone()));
    dispatcher.register(FollowUpHandler::new(deps.clone()));
    dispatcher.register(ViewClosedHandler);
    dispatcher.register(ReactionHandler::new(deps.slack.clone(), trigger_emojis));
    dispatcher.register(DirectMessageHandler::new(deps.clone()));
    dispatcher.register(AppHomeHandler::new(deps.slack));
    dispatcher
}
