use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use eli5_core::config::LlmProvider;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    llm_provider: LlmProvider,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub status: &'static str,
    pub llm_provider: &'static str,
    pub checked_at: String,
}

pub fn router(llm_provider: LlmProvider) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { llm_provider })
}

/// Liveness only. A missing LLM provider still serves requests (users get a
/// setup notice), so it is reported as `degraded` without failing the check.
pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    let status = match state.llm_provider {
        LlmProvider::Unconfigured => "degraded",
        LlmProvider::Gateway | LlmProvider::Anthropic => "ready",
    };

    Json(HealthResponse {
        ok: true,
        status,
        llm_provider: state.llm_provider.as_str(),
        checked_at: Utc::now().to_rfc3339(),
    })
}
