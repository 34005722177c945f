use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use eli5_core::config::{AppConfig, DispatchMode};
use eli5_slack::{
    events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope},
    signature::{SignatureError, SignatureVerifier, LAZY_SIGNATURE_HEADER, LAZY_TIMESTAMP_HEADER},
};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub const LAZY_PATH: &str = "/slack/lazy";

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("envelope could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Sign(#[from] SignatureError),
    #[error("handoff request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("handoff endpoint answered {0}")]
    Status(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferOutcome {
    Spawned,
    HandedOff,
    /// The secondary call did not answer inside the handoff window; the
    /// receiving invocation keeps working on it.
    HandoffPending,
    /// The secondary call failed, so the work runs on a local task instead.
    FellBack,
}

enum Mode {
    Background,
    SelfInvoke {
        http: reqwest::Client,
        endpoint: String,
        signer: SignatureVerifier,
        handoff_timeout: Duration,
    },
}

/// Runs the slow part of an envelope after Slack has been acknowledged.
#[derive(Clone)]
pub struct DeferredRunner {
    dispatcher: Arc<EventDispatcher>,
    mode: Arc<Mode>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl DeferredRunner {
    pub fn background(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher, mode: Arc::new(Mode::Background), tasks: Arc::default() }
    }

    pub fn self_invoke(
        dispatcher: Arc<EventDispatcher>,
        public_url: &str,
        signer: SignatureVerifier,
        handoff_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        let endpoint = format!("{}{LAZY_PATH}", public_url.trim_end_matches('/'));
        Ok(Self {
            dispatcher,
            mode: Arc::new(Mode::SelfInvoke { http, endpoint, signer, handoff_timeout }),
            tasks: Arc::default(),
        })
    }

    pub fn from_config(
        config: &AppConfig,
        dispatcher: Arc<EventDispatcher>,
        signer: SignatureVerifier,
    ) -> Result<Self, reqwest::Error> {
        match (&config.server.dispatch_mode, &config.server.public_url) {
            (DispatchMode::SelfInvoke, Some(public_url)) => Self::self_invoke(
                dispatcher,
                public_url,
                signer,
                Duration::from_secs(config.server.handoff_timeout_secs),
            ),
            _ => Ok(Self::background(dispatcher)),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode.as_ref() {
            Mode::Background => "background",
            Mode::SelfInvoke { .. } => "self_invoke",
        }
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub async fn defer(&self, envelope: SlackEnvelope) -> DeferOutcome {
        let Mode::SelfInvoke { http, endpoint, signer, handoff_timeout } = self.mode.as_ref() else {
            self.spawn(envelope);
            return DeferOutcome::Spawned;
        };

        match hand_off(http, endpoint, signer, *handoff_timeout, &envelope).await {
            Ok(outcome) => {
                info!(
                    event_name = "server.deferred.handed_off",
                    correlation_id = %envelope.envelope_id,
                    event_type = envelope.event.event_type().as_str(),
                    pending = outcome == DeferOutcome::HandoffPending,
                    "deferred work handed to secondary invocation"
                );
                outcome
            }
            Err(error) => {
                warn!(
                    event_name = "server.deferred.handoff_failed",
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "secondary invocation failed, running work locally"
                );
                self.spawn(envelope);
                DeferOutcome::FellBack
            }
        }
    }

    fn spawn(&self, envelope: SlackEnvelope) {
        let dispatcher = self.dispatcher.clone();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { run_envelope(&dispatcher, &envelope).await });
    }

    /// Local tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Waits for local tasks to finish, at most `grace`. Returns how many
    /// were still running when the grace period ran out.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut tasks =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let _ = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        tasks.len()
    }
}

async fn hand_off(
    http: &reqwest::Client,
    endpoint: &str,
    signer: &SignatureVerifier,
    handoff_timeout: Duration,
    envelope: &SlackEnvelope,
) -> Result<DeferOutcome, HandoffError> {
    let body = serde_json::to_vec(envelope)?;
    let timestamp = chrono::Utc::now().timestamp();
    let signature = signer.sign(timestamp, &body)?;

    let request = http
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(LAZY_TIMESTAMP_HEADER, timestamp.to_string())
        .header(LAZY_SIGNATURE_HEADER, signature)
        .body(body)
        .send();

    match tokio::time::timeout(handoff_timeout, request).await {
        Err(_elapsed) => Ok(DeferOutcome::HandoffPending),
        Ok(Err(error)) => Err(HandoffError::Transport(error)),
        Ok(Ok(response)) if response.status().is_success() => Ok(DeferOutcome::HandedOff),
        Ok(Ok(response)) => Err(HandoffError::Status(response.status().as_u16())),
    }
}

/// Dispatches one envelope to its handler and logs how it went.
pub async fn run_envelope(dispatcher: &EventDispatcher, envelope: &SlackEnvelope) {
    let ctx = EventContext::for_envelope(envelope);
    let event_type = envelope.event.event_type();

    match dispatcher.dispatch(envelope, &ctx).await {
        Ok(HandlerResult::Processed) => info!(
            event_name = "server.deferred.completed",
            correlation_id = %ctx.correlation_id,
            event_type = event_type.as_str(),
            "deferred work completed"
        ),
        Ok(HandlerResult::Ignored) => info!(
            event_name = "server.deferred.ignored",
            correlation_id = %ctx.correlation_id,
            event_type = event_type.as_str(),
            "event ignored by handler"
        ),
        Err(error) => error!(
            event_name = "server.deferred.failed",
            correlation_id = %ctx.correlation_id,
            event_type = event_type.as_str(),
            error = %error,
            "deferred work failed"
        ),
    }
}
