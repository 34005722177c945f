use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use eli5_agent::{
    llm::{CompletionRequest, LlmClient, LlmError},
    Explainer,
};
use eli5_core::config::LlmProvider;
use eli5_slack::{
    api::{HistoryQuery, OutgoingMessage, SlackApi, SlackApiError},
    blocks::View,
    events::SlackMessage,
    extract::UrlFetcher,
};
use tokio::sync::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum SlackCall {
    PostMessage(OutgoingMessage),
    PostEphemeral { user_id: String, message: OutgoingMessage },
    OpenView { trigger_id: String, view: View },
    UpdateView { view_id: String, view: View },
    PublishView { user_id: String, view: View },
    OpenDm { user_id: String },
    History(HistoryQuery),
}

/// In-memory `SlackApi` that records every call in order.
#[derive(Default)]
pub struct RecordingSlack {
    pub calls: Mutex<Vec<SlackCall>>,
    pub history: Mutex<VecDeque<Result<Vec<SlackMessage>, SlackApiError>>>,
    pub post_error: Mutex<Option<SlackApiError>>,
    pub open_view_error: Mutex<Option<SlackApiError>>,
}

impl RecordingSlack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push_history(&self, messages: Vec<SlackMessage>) {
        self.history.lock().await.push_back(Ok(messages));
    }

    pub async fn push_history_error(&self, error: &str) {
        self.history.lock().await.push_back(Err(SlackApiError::Api {
            method: "conversations.history".to_owned(),
            error: error.to_owned(),
        }));
    }

    pub async fn fail_posts_with(&self, error: &str) {
        *self.post_error.lock().await = Some(SlackApiError::Api {
            method: "chat.postMessage".to_owned(),
            error: error.to_owned(),
        });
    }

    pub async fn fail_open_view_with(&self, error: &str) {
        *self.open_view_error.lock().await =
            Some(SlackApiError::Api { method: "views.open".to_owned(), error: error.to_owned() });
    }

    pub async fn calls(&self) -> Vec<SlackCall> {
        self.calls.lock().await.clone()
    }

    pub async fn posted_texts(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                SlackCall::PostMessage(message) => Some(message.text),
                _ => None,
            })
            .collect()
    }

    pub async fn updated_views(&self) -> Vec<View> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                SlackCall::UpdateView { view, .. } => Some(view),
                _ => None,
            })
            .collect()
    }

    pub async fn ephemeral_posts(&self) -> Vec<(String, OutgoingMessage)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                SlackCall::PostEphemeral { user_id, message } => Some((user_id, message)),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: SlackCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl SlackApi for RecordingSlack {
    async fn post_message(&self, message: OutgoingMessage) -> Result<(), SlackApiError> {
        self.record(SlackCall::PostMessage(message)).await;
        match self.post_error.lock().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn post_ephemeral(
        &self,
        user_id: &str,
        message: OutgoingMessage,
    ) -> Result<(), SlackApiError> {
        self.record(SlackCall::PostEphemeral { user_id: user_id.to_owned(), message }).await;
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<String, SlackApiError> {
        self.record(SlackCall::OpenView { trigger_id: trigger_id.to_owned(), view: view.clone() })
            .await;
        match self.open_view_error.lock().await.take() {
            Some(error) => Err(error),
            None => Ok("V-LOADING".to_owned()),
        }
    }

    async fn update_view(&self, view_id: &str, view: &View) -> Result<(), SlackApiError> {
        self.record(SlackCall::UpdateView { view_id: view_id.to_owned(), view: view.clone() })
            .await;
        Ok(())
    }

    async fn publish_view(&self, user_id: &str, view: &View) -> Result<(), SlackApiError> {
        self.record(SlackCall::PublishView { user_id: user_id.to_owned(), view: view.clone() })
            .await;
        Ok(())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
        self.record(SlackCall::OpenDm { user_id: user_id.to_owned() }).await;
        Ok(format!("D-{user_id}"))
    }

    async fn conversation_history(
        &self,
        query: HistoryQuery,
    ) -> Result<Vec<SlackMessage>, SlackApiError> {
        self.record(SlackCall::History(query)).await;
        self.history.lock().await.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn download_file(&self, _url: &str) -> Result<Vec<u8>, SlackApiError> {
        Ok(Vec::new())
    }
}

pub struct NoFetch;

#[async_trait]
impl UrlFetcher for NoFetch {
    async fn fetch_text(&self, _url: &str) -> Option<String> {
        None
    }
}

/// `LlmClient` answering from a queue and keeping every request it saw.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn replying(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()), requests: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Gateway
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().await.push(request.clone());
        self.replies.lock().await.pop_front().unwrap_or(Err(LlmError::EmptyResponse))
    }
}

pub fn explainer_with(llm: Arc<ScriptedLlm>) -> Arc<Explainer> {
    Arc::new(Explainer::new(Some(llm)).expect("explainer"))
}

pub fn slack_message(text: &str) -> SlackMessage {
    SlackMessage { ts: "1700000000.000100".to_owned(), text: text.to_owned(), ..SlackMessage::default() }
}
