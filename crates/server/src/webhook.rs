//! Slack webhook endpoints.
//!
//! `/slack/events` (and the `/api/slack` alias) must answer inside Slack's
//! three second window: verify, acknowledge, hand the slow part to the
//! [`DeferredRunner`], return the ack body. `/slack/lazy` is the receiving end
//! of a self-invoke handoff and runs the work to completion.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use eli5_slack::{
    events::{parse_request, AckResponse, EventContext, SlackEnvelope},
    signature::{
        SignatureVerifier, LAZY_SIGNATURE_HEADER, LAZY_TIMESTAMP_HEADER, SLACK_RETRY_NUM_HEADER,
        SLACK_SIGNATURE_HEADER, SLACK_TIMESTAMP_HEADER,
    },
};
use tracing::{debug, error, info, warn};

use crate::runner::{run_envelope, DeferredRunner, LAZY_PATH};

#[derive(Clone)]
pub struct WebhookState {
    pub slack_verifier: SignatureVerifier,
    pub lazy_verifier: SignatureVerifier,
    pub runner: DeferredRunner,
    pub worker_timeout: Duration,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/api/slack", post(slack_events))
        .route(LAZY_PATH, post(lazy_events))
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn slack_events(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(error) = state.slack_verifier.verify(
        header(&headers, SLACK_TIMESTAMP_HEADER),
        header(&headers, SLACK_SIGNATURE_HEADER),
        &body,
    ) {
        warn!(event_name = "server.webhook.unauthorized", error = %error, "rejected slack request");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // The first delivery is already being handled; a retry would duplicate
    // the user-visible reply.
    if let Some(retry_num) = header(&headers, SLACK_RETRY_NUM_HEADER) {
        info!(
            event_name = "server.webhook.retry_ignored",
            retry_num,
            retry_reason = header(&headers, "x-slack-retry-reason").unwrap_or("unknown"),
            "ignoring slack retry"
        );
        return StatusCode::OK.into_response();
    }

    let envelope = match parse_request(header(&headers, CONTENT_TYPE.as_str()), &body) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(event_name = "server.webhook.bad_payload", error = %error, "malformed slack payload");
            return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
        }
    };

    let ctx = EventContext::for_envelope(&envelope);
    let dispatcher = state.runner.dispatcher();
    let ack = dispatcher.acknowledge(&envelope);
    debug!(
        event_name = "server.webhook.acknowledged",
        correlation_id = %ctx.correlation_id,
        envelope_id = %envelope.envelope_id,
        event_type = envelope.event.event_type().as_str(),
        "slack event acknowledged"
    );

    if dispatcher.needs_deferred_work(&envelope, &ack) {
        state.runner.defer(envelope).await;
    }

    ack_response(&ack)
}

fn ack_response(ack: &AckResponse) -> Response {
    match ack.body() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

pub async fn lazy_events(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(error) = state.lazy_verifier.verify(
        header(&headers, LAZY_TIMESTAMP_HEADER),
        header(&headers, LAZY_SIGNATURE_HEADER),
        &body,
    ) {
        warn!(event_name = "server.lazy.unauthorized", error = %error, "rejected deferred request");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let envelope: SlackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(event_name = "server.lazy.bad_payload", error = %error, "malformed deferred envelope");
            return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
        }
    };

    let correlation_id = envelope.envelope_id.clone();
    let dispatcher = state.runner.dispatcher().clone();
    let worker = tokio::spawn(async move { run_envelope(&dispatcher, &envelope).await });

    match tokio::time::timeout(state.worker_timeout, worker).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(join_error)) => {
            error!(
                event_name = "server.lazy.worker_panicked",
                correlation_id = %correlation_id,
                error = %join_error,
                "deferred worker did not finish"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(_elapsed) => {
            warn!(
                event_name = "server.lazy.worker_timeout",
                correlation_id = %correlation_id,
                timeout_secs = state.worker_timeout.as_secs(),
                "deferred worker still running after timeout"
            );
            StatusCode::ACCEPTED.into_response()
        }
    }
}
