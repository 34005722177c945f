use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use eli5_core::{
    config::{LlmConfig, LlmProvider},
    conversation::Role,
};
use eli5_slack::extract::ImageAttachment;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm upstream returned http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response had no text content")]
    EmptyResponse,
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(error) => !error.is_builder(),
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::EmptyResponse => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// Images are sent ahead of the text.
    Parts { images: Vec<ImageAttachment>, text: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self { role, content: MessageContent::Text(text.into()) }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> LlmProvider;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, initial_backoff: INITIAL_BACKOFF }
    }

    /// Runs `attempt` until it succeeds, fails permanently or retries run out.
    /// The delay doubles after every retryable failure.
    pub async fn run<T, F, Fut>(&self, provider: LlmProvider, mut attempt: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut delay = self.initial_backoff;
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        provider = provider.as_str(),
                        attempt = retries,
                        retry_in = ?delay,
                        error = %error,
                        "retryable llm error"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

async fn post_json(request: reqwest::RequestBuilder, body: &Value) -> Result<Value, LlmError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status { status: status.as_u16(), body });
    }
    Ok(response.json().await?)
}

/// OpenAI-compatible `chat/completions` endpoint, such as an AI gateway.
pub struct GatewayClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    retry: RetryPolicy,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            model: model.into(),
            retry,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system })];
        messages.extend(request.messages.iter().map(|message| {
            let content = match &message.content {
                MessageContent::Text(text) => json!(text),
                MessageContent::Parts { images, text } => {
                    let mut parts: Vec<Value> = images
                        .iter()
                        .map(|image| {
                            json!({
                                "type": "image_url",
                                "image_url": {
                                    "url": format!("data:{};base64,{}", image.mime_type, image.base64)
                                }
                            })
                        })
                        .collect();
                    parts.push(json!({ "type": "text", "text": text }));
                    Value::Array(parts)
                }
            };
            json!({ "role": message.role.as_str(), "content": content })
        }));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for GatewayClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Gateway
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = self.request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .retry
            .run(self.provider(), || {
                post_json(self.http.post(&url).bearer_auth(self.api_key.expose_secret()), &body)
            })
            .await?;

        response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Anthropic Messages API.
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    retry: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            model: model.into(),
            retry,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|message| {
                let content = match &message.content {
                    MessageContent::Text(text) => json!(text),
                    MessageContent::Parts { images, text } => {
                        let mut parts: Vec<Value> = images
                            .iter()
                            .map(|image| {
                                json!({
                                    "type": "image",
                                    "source": {
                                        "type": "base64",
                                        "media_type": image.mime_type,
                                        "data": image.base64,
                                    }
                                })
                            })
                            .collect();
                        parts.push(json!({ "type": "text", "text": text }));
                        Value::Array(parts)
                    }
                };
                json!({ "role": message.role.as_str(), "content": content })
            })
            .collect();

        json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system,
            "messages": messages,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Anthropic
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = self.request_body(request);
        let url = format!("{}/messages", self.base_url);

        let response = self
            .retry
            .run(self.provider(), || {
                post_json(
                    self.http
                        .post(&url)
                        .header("x-api-key", self.api_key.expose_secret())
                        .header("anthropic-version", ANTHROPIC_VERSION),
                    &body,
                )
            })
            .await?;

        response
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks.iter().find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            })
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Builds the client for whichever provider the config selects.
pub fn client_from_config(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>, LlmError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let retry = RetryPolicy::new(config.max_retries);

    let client: Arc<dyn LlmClient> = match config.provider() {
        LlmProvider::Gateway => match &config.gateway_api_key {
            Some(key) => Arc::new(GatewayClient::new(
                config.gateway_base_url.clone(),
                key.clone(),
                config.gateway_model.clone(),
                timeout,
                retry,
            )?),
            None => return Ok(None),
        },
        LlmProvider::Anthropic => match &config.anthropic_api_key {
            Some(key) => Arc::new(AnthropicClient::new(
                config.anthropic_base_url.clone(),
                key.clone(),
                config.anthropic_model.clone(),
                timeout,
                retry,
            )?),
            None => return Ok(None),
        },
        LlmProvider::Unconfigured => return Ok(None),
    };
    Ok(Some(client))
}
