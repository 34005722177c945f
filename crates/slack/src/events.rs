use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::{api::SlackApiError, blocks::View};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_num: Option<u32>,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlackEvent {
    UrlVerification { challenge: String },
    MessageShortcut(MessageShortcutEvent),
    BlockAction(BlockActionEvent),
    ViewSubmission(ViewSubmissionEvent),
    ViewClosed(ViewClosedEvent),
    Message(MessageEvent),
    ReactionAdded(ReactionAddedEvent),
    AppHomeOpened { user_id: String },
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::UrlVerification { .. } => SlackEventType::UrlVerification,
            Self::MessageShortcut(_) => SlackEventType::MessageShortcut,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::ViewClosed(_) => SlackEventType::ViewClosed,
            Self::Message(_) => SlackEventType::Message,
            Self::ReactionAdded(_) => SlackEventType::ReactionAdded,
            Self::AppHomeOpened { .. } => SlackEventType::AppHomeOpened,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    UrlVerification,
    MessageShortcut,
    BlockAction,
    ViewSubmission,
    ViewClosed,
    Message,
    ReactionAdded,
    AppHomeOpened,
    Unsupported,
}

impl SlackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UrlVerification => "url_verification",
            Self::MessageShortcut => "message_shortcut",
            Self::BlockAction => "block_action",
            Self::ViewSubmission => "view_submission",
            Self::ViewClosed => "view_closed",
            Self::Message => "message",
            Self::ReactionAdded => "reaction_added",
            Self::AppHomeOpened => "app_home_opened",
            Self::Unsupported => "unsupported",
        }
    }
}

/// A Slack message as returned inside shortcuts and `conversations.history`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackMessage {
    pub ts: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SlackAttachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SlackFile>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_private: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_private_download: Option<String>,
}

impl SlackFile {
    pub fn download_url(&self) -> Option<&str> {
        self.url_private_download.as_deref().or(self.url_private.as_deref())
    }
}

pub const EXPLAIN_PRIVATE_CALLBACK: &str = "explain_jargon";
pub const EXPLAIN_PUBLIC_CALLBACK: &str = "explain_jargon_public";
pub const CHAT_ABOUT_THIS_ACTION: &str = "chat_about_this";
pub const FOLLOWUP_CALLBACK: &str = "eli5_followup";
pub const FOLLOWUP_BLOCK_ID: &str = "followup_block";
pub const FOLLOWUP_ACTION_ID: &str = "followup_input";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageShortcutEvent {
    pub callback_id: String,
    pub trigger_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub message: SlackMessage,
}

/// The modal a block action or submission came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRef {
    pub id: String,
    #[serde(default)]
    pub callback_id: String,
    #[serde(default)]
    pub private_metadata: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockActionEvent {
    pub action_id: String,
    pub user_id: String,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub view: Option<ViewRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSubmissionEvent {
    pub callback_id: String,
    pub user_id: String,
    pub view_id: String,
    pub private_metadata: String,
    #[serde(default)]
    pub followup: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewClosedEvent {
    pub callback_id: String,
    pub user_id: String,
    pub view_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub channel_id: String,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl MessageEvent {
    /// A message a person typed into a DM with the bot.
    pub fn is_direct_message(&self) -> bool {
        self.channel_type.as_deref() == Some("im")
            && self.bot_id.is_none()
            && self.subtype.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionAddedEvent {
    pub user_id: String,
    pub reaction: String,
    pub channel_id: String,
    pub message_ts: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("body is not valid json: {0}")]
    InvalidJson(String),
    #[error("form body could not be decoded: {0}")]
    InvalidForm(String),
    #[error("form body has no `payload` field")]
    MissingPayload,
    #[error("payload is missing `{0}`")]
    MissingField(&'static str),
}

/// Parses an Events API JSON body.
pub fn parse_events_api(body: &[u8]) -> Result<SlackEnvelope, PayloadError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|err| PayloadError::InvalidJson(err.to_string()))?;
    let payload_type = str_at(&payload, &["type"]).unwrap_or_default();

    let event = match payload_type {
        "url_verification" => SlackEvent::UrlVerification {
            challenge: required_str(&payload, &["challenge"], "challenge")?,
        },
        "event_callback" => parse_callback_event(&payload["event"])?,
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    let envelope_id = str_at(&payload, &["event_id"]).map(str::to_owned).unwrap_or_else(new_id);
    Ok(SlackEnvelope { envelope_id, retry_num: None, event })
}

fn parse_callback_event(event: &Value) -> Result<SlackEvent, PayloadError> {
    let event_type = required_str(event, &["type"], "event.type")?;

    Ok(match event_type.as_str() {
        "message" => SlackEvent::Message(MessageEvent {
            channel_id: required_str(event, &["channel"], "event.channel")?,
            channel_type: owned_at(event, &["channel_type"]),
            user_id: owned_at(event, &["user"]),
            text: owned_at(event, &["text"]).unwrap_or_default(),
            ts: owned_at(event, &["ts"]).unwrap_or_default(),
            bot_id: owned_at(event, &["bot_id"]),
            subtype: owned_at(event, &["subtype"]),
        }),
        "reaction_added" => SlackEvent::ReactionAdded(ReactionAddedEvent {
            user_id: required_str(event, &["user"], "event.user")?,
            reaction: required_str(event, &["reaction"], "event.reaction")?,
            channel_id: required_str(event, &["item", "channel"], "event.item.channel")?,
            message_ts: required_str(event, &["item", "ts"], "event.item.ts")?,
        }),
        "app_home_opened" => SlackEvent::AppHomeOpened {
            user_id: required_str(event, &["user"], "event.user")?,
        },
        _ => SlackEvent::Unsupported { event_type },
    })
}

/// Parses a form encoded interactivity body (`payload=<json>`).
pub fn parse_interaction(body: &[u8]) -> Result<SlackEnvelope, PayloadError> {
    let fields: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|err| PayloadError::InvalidForm(err.to_string()))?;
    let raw = fields
        .into_iter()
        .find_map(|(key, value)| (key == "payload").then_some(value))
        .ok_or(PayloadError::MissingPayload)?;
    let payload: Value =
        serde_json::from_str(&raw).map_err(|err| PayloadError::InvalidJson(err.to_string()))?;

    let payload_type = str_at(&payload, &["type"]).unwrap_or_default();
    let event = match payload_type {
        "message_action" => SlackEvent::MessageShortcut(MessageShortcutEvent {
            callback_id: required_str(&payload, &["callback_id"], "callback_id")?,
            trigger_id: required_str(&payload, &["trigger_id"], "trigger_id")?,
            user_id: required_str(&payload, &["user", "id"], "user.id")?,
            channel_id: owned_at(&payload, &["channel", "id"]).unwrap_or_default(),
            message: serde_json::from_value(payload["message"].clone()).unwrap_or_default(),
        }),
        "block_actions" => {
            let action = payload["actions"].get(0).ok_or(PayloadError::MissingField("actions"))?;
            SlackEvent::BlockAction(BlockActionEvent {
                action_id: required_str(action, &["action_id"], "actions[0].action_id")?,
                user_id: required_str(&payload, &["user", "id"], "user.id")?,
                trigger_id: owned_at(&payload, &["trigger_id"]),
                value: owned_at(action, &["value"]),
                view: payload.get("view").and_then(parse_view_ref),
            })
        }
        "view_submission" => {
            let view = payload.get("view").ok_or(PayloadError::MissingField("view"))?;
            SlackEvent::ViewSubmission(ViewSubmissionEvent {
                callback_id: owned_at(view, &["callback_id"]).unwrap_or_default(),
                user_id: required_str(&payload, &["user", "id"], "user.id")?,
                view_id: required_str(view, &["id"], "view.id")?,
                private_metadata: owned_at(view, &["private_metadata"]).unwrap_or_default(),
                followup: owned_at(
                    view,
                    &["state", "values", FOLLOWUP_BLOCK_ID, FOLLOWUP_ACTION_ID, "value"],
                ),
            })
        }
        "view_closed" => {
            let view = payload.get("view").ok_or(PayloadError::MissingField("view"))?;
            SlackEvent::ViewClosed(ViewClosedEvent {
                callback_id: owned_at(view, &["callback_id"]).unwrap_or_default(),
                user_id: required_str(&payload, &["user", "id"], "user.id")?,
                view_id: required_str(view, &["id"], "view.id")?,
            })
        }
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    Ok(SlackEnvelope { envelope_id: new_id(), retry_num: None, event })
}

/// Picks the parser for an HTTP body based on its content type.
pub fn parse_request(content_type: Option<&str>, body: &[u8]) -> Result<SlackEnvelope, PayloadError> {
    let is_form = content_type
        .map(|value| value.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        parse_interaction(body)
    } else {
        parse_events_api(body)
    }
}

fn parse_view_ref(view: &Value) -> Option<ViewRef> {
    Some(ViewRef {
        id: owned_at(view, &["id"])?,
        callback_id: owned_at(view, &["callback_id"]).unwrap_or_default(),
        private_metadata: owned_at(view, &["private_metadata"]).unwrap_or_default(),
    })
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter().try_fold(value, |current, key| current.get(key))?.as_str()
}

fn owned_at(value: &Value, path: &[&str]) -> Option<String> {
    str_at(value, path).map(str::to_owned)
}

fn required_str(value: &Value, path: &[&str], field: &'static str) -> Result<String, PayloadError> {
    owned_at(value, path)
        .filter(|value| !value.is_empty())
        .ok_or(PayloadError::MissingField(field))
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

impl EventContext {
    pub fn for_envelope(envelope: &SlackEnvelope) -> Self {
        Self { correlation_id: envelope.envelope_id.clone() }
    }
}

/// Inline reply sent as the HTTP response body inside Slack's ack window.
#[derive(Clone, Debug, PartialEq)]
pub enum AckResponse {
    Empty,
    Challenge(String),
    UpdateView(View),
    ViewErrors(BTreeMap<String, String>),
}

impl AckResponse {
    pub fn view_error(block_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ViewErrors(BTreeMap::from([(block_id.into(), message.into())]))
    }

    pub fn body(&self) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Challenge(challenge) => Some(json!({ "challenge": challenge })),
            Self::UpdateView(view) => Some(json!({ "response_action": "update", "view": view })),
            Self::ViewErrors(errors) => {
                Some(json!({ "response_action": "errors", "errors": errors }))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error("llm failure: {0}")]
    Llm(String),
    #[error("payload failure: {0}")]
    Payload(String),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;

    fn acknowledge(&self, _envelope: &SlackEnvelope) -> AckResponse {
        AckResponse::Empty
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub fn acknowledge(&self, envelope: &SlackEnvelope) -> AckResponse {
        if let SlackEvent::UrlVerification { challenge } = &envelope.event {
            return AckResponse::Challenge(challenge.clone());
        }

        self.handlers
            .get(&envelope.event.event_type())
            .map(|handler| handler.acknowledge(envelope))
            .unwrap_or(AckResponse::Empty)
    }

    /// Whether the envelope still has work to do after `ack` was sent.
    pub fn needs_deferred_work(&self, envelope: &SlackEnvelope, ack: &AckResponse) -> bool {
        if matches!(ack, AckResponse::Challenge(_) | AckResponse::ViewErrors(_)) {
            return false;
        }
        self.handlers.contains_key(&envelope.event.event_type())
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let event_type = envelope.event.event_type();
        let Some(handler) = self.handlers.get(&event_type) else {
            debug!(
                event_name = "slack.dispatch.ignored",
                correlation_id = %ctx.correlation_id,
                event_type = event_type.as_str(),
                "no handler registered"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
