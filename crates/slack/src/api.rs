use std::time::Duration;

use async_trait::async_trait;
use eli5_core::config::SlackConfig;
use reqwest::{header::AUTHORIZATION, Client};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::{
    blocks::{Block, MessageTemplate, View},
    events::SlackMessage,
};

const API_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("slack `{method}` failed: {error}")]
    Api { method: String, error: String },
    #[error("slack `{method}` returned http {status}")]
    Status { method: String, status: u16 },
    #[error("slack `{method}` response is missing `{field}`")]
    MissingField { method: String, field: &'static str },
    #[error("slack transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SlackApiError {
    pub fn api_error(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The bot is not a member of the channel it tried to post in.
    pub fn is_not_in_channel(&self) -> bool {
        self.api_error() == Some("not_in_channel")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    pub blocks: Vec<Block>,
    pub thread_ts: Option<String>,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self { channel: channel.into(), text: text.into(), blocks: Vec::new(), thread_ts: None }
    }

    pub fn from_template(channel: impl Into<String>, template: MessageTemplate) -> Self {
        Self {
            channel: channel.into(),
            text: template.fallback_text,
            blocks: template.blocks,
            thread_ts: None,
        }
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    pub channel: String,
    pub latest: Option<String>,
    pub limit: u32,
    pub inclusive: bool,
}

impl HistoryQuery {
    /// The single message at `ts`.
    pub fn single(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self { channel: channel.into(), latest: Some(ts.into()), limit: 1, inclusive: true }
    }

    /// The most recent `limit` messages, newest first.
    pub fn recent(channel: impl Into<String>, limit: u32) -> Self {
        Self { channel: channel.into(), latest: None, limit, inclusive: false }
    }
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn post_message(&self, message: OutgoingMessage) -> Result<(), SlackApiError>;

    async fn post_ephemeral(
        &self,
        user_id: &str,
        message: OutgoingMessage,
    ) -> Result<(), SlackApiError>;

    /// Returns the id of the opened view.
    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<String, SlackApiError>;

    async fn update_view(&self, view_id: &str, view: &View) -> Result<(), SlackApiError>;

    async fn publish_view(&self, user_id: &str, view: &View) -> Result<(), SlackApiError>;

    /// Returns the DM channel id.
    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError>;

    async fn conversation_history(
        &self,
        query: HistoryQuery,
    ) -> Result<Vec<SlackMessage>, SlackApiError>;

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError>;
}

pub struct SlackWebClient {
    http: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Result<Self, SlackApiError> {
        let http = Client::builder().timeout(API_TIMEOUT).build()?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_owned(), bot_token })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackApiError> {
        Self::new(config.api_base_url.clone(), config.bot_token.clone())
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.bot_token.expose_secret())
    }

    async fn call_json(&self, method: &str, body: Value) -> Result<Value, SlackApiError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .await?;
        read_response(method, response).await
    }

    async fn call_form(
        &self,
        method: &str,
        fields: &[(&str, String)],
    ) -> Result<Value, SlackApiError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .header(AUTHORIZATION, self.bearer())
            .form(fields)
            .send()
            .await?;
        read_response(method, response).await
    }
}

async fn read_response(method: &str, response: reqwest::Response) -> Result<Value, SlackApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SlackApiError::Status { method: method.to_owned(), status: status.as_u16() });
    }

    let body: Value = response.json().await?;
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        if let Some(warning) = body.get("warning").and_then(Value::as_str) {
            warn!(event_name = "slack.api.warning", method, warning, "slack api warning");
        }
        return Ok(body);
    }

    let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error").to_owned();
    Err(SlackApiError::Api { method: method.to_owned(), error })
}

fn message_body(message: &OutgoingMessage) -> Value {
    let mut body = json!({ "channel": message.channel, "text": message.text });
    if !message.blocks.is_empty() {
        body["blocks"] = json!(message.blocks);
    }
    if let Some(thread_ts) = &message.thread_ts {
        body["thread_ts"] = json!(thread_ts);
    }
    body
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn post_message(&self, message: OutgoingMessage) -> Result<(), SlackApiError> {
        self.call_json("chat.postMessage", message_body(&message)).await.map(|_| ())
    }

    async fn post_ephemeral(
        &self,
        user_id: &str,
        message: OutgoingMessage,
    ) -> Result<(), SlackApiError> {
        let mut body = message_body(&message);
        body["user"] = json!(user_id);
        self.call_json("chat.postEphemeral", body).await.map(|_| ())
    }

    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<String, SlackApiError> {
        let method = "views.open";
        let body = self.call_json(method, json!({ "trigger_id": trigger_id, "view": view })).await?;
        body.pointer("/view/id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(SlackApiError::MissingField { method: method.to_owned(), field: "view.id" })
    }

    async fn update_view(&self, view_id: &str, view: &View) -> Result<(), SlackApiError> {
        self.call_json("views.update", json!({ "view_id": view_id, "view": view })).await.map(|_| ())
    }

    async fn publish_view(&self, user_id: &str, view: &View) -> Result<(), SlackApiError> {
        self.call_json("views.publish", json!({ "user_id": user_id, "view": view }))
            .await
            .map(|_| ())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
        let method = "conversations.open";
        let body = self.call_json(method, json!({ "users": user_id })).await?;
        body.pointer("/channel/id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(SlackApiError::MissingField { method: method.to_owned(), field: "channel.id" })
    }

    async fn conversation_history(
        &self,
        query: HistoryQuery,
    ) -> Result<Vec<SlackMessage>, SlackApiError> {
        let mut fields = vec![("channel", query.channel), ("limit", query.limit.to_string())];
        if let Some(latest) = query.latest {
            fields.push(("latest", latest));
        }
        if query.inclusive {
            fields.push(("inclusive", "true".to_owned()));
        }

        let body = self.call_form("conversations.history", &fields).await?;
        let messages = body
            .get("messages")
            .cloned()
            .map(serde_json::from_value::<Vec<SlackMessage>>)
            .transpose()
            .map_err(|_| SlackApiError::MissingField {
                method: "conversations.history".to_owned(),
                field: "messages",
            })?;
        Ok(messages.unwrap_or_default())
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError> {
        let response = self.http.get(url).header(AUTHORIZATION, self.bearer()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlackApiError::Status {
                method: "files.download".to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
