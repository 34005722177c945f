use std::{sync::Arc, time::Duration};

use axum::Router;
use eli5_agent::{client_from_config, ExplainError, Explainer, LlmError};
use eli5_core::config::{AppConfig, ConfigError, LlmProvider};
use eli5_slack::{
    api::{SlackApiError, SlackWebClient},
    extract::HttpUrlFetcher,
    signature::SignatureVerifier,
};
use thiserror::Error;
use tracing::info;

use crate::{
    handlers::{build_dispatcher, HandlerDeps},
    health,
    runner::DeferredRunner,
    webhook::{self, WebhookState},
};

pub struct Application {
    pub config: AppConfig,
    pub llm_provider: LlmProvider,
    pub dispatch_mode: &'static str,
    pub runner: DeferredRunner,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[from] SlackApiError),
    #[error("llm client setup failed: {0}")]
    LlmClient(#[from] LlmError),
    #[error("prompt templates failed to load: {0}")]
    Prompts(#[from] ExplainError),
    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let slack = Arc::new(SlackWebClient::from_config(&config.slack)?);
    let fetcher = Arc::new(HttpUrlFetcher::new()?);
    let explainer = Arc::new(Explainer::new(client_from_config(&config.llm)?)?);
    let llm_provider = explainer.provider();

    let dispatcher = Arc::new(build_dispatcher(
        HandlerDeps { slack, fetcher, explainer },
        config.slack.trigger_emojis.clone(),
    ));

    let tolerance = config.slack.signature_tolerance_secs;
    let lazy_verifier = SignatureVerifier::lazy(config.slack.signing_secret.clone(), tolerance);
    let runner = DeferredRunner::from_config(&config, dispatcher.clone(), lazy_verifier.clone())?;
    let dispatch_mode = runner.mode_name();

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = llm_provider.as_str(),
        dispatch_mode,
        handler_count = dispatcher.handler_count(),
        "application wired"
    );

    let router = health::router(llm_provider).merge(webhook::router(WebhookState {
        slack_verifier: SignatureVerifier::slack(config.slack.signing_secret.clone(), tolerance),
        lazy_verifier,
        runner: runner.clone(),
        worker_timeout: Duration::from_secs(config.server.worker_timeout_secs),
    }));

    Ok(Application { config, llm_provider, dispatch_mode, runner, router })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use eli5_core::config::{AppConfig, ConfigOverrides, DispatchMode, LlmProvider, LoadOptions};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{bootstrap_with_config, Application, BootstrapError};

    fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?)
    }

    fn overrides() -> ConfigOverrides {
        ConfigOverrides {
            slack_bot_token: Some("xoxb-test".to_owned()),
            slack_signing_secret: Some("secret".to_owned()),
            llm_gateway_api_key: Some("gw-key".to_owned()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn bootstrap_fails_fast_with_an_app_level_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                slack_bot_token: Some("xapp-wrong-kind".to_owned()),
                ..overrides()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.bot_token"));
    }

    #[test]
    fn self_invoke_mode_is_wired_when_public_url_is_set() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                dispatch_mode: Some(DispatchMode::SelfInvoke),
                public_url: Some("https://eli5.example.com".to_owned()),
                ..overrides()
            },
            ..LoadOptions::default()
        })
        .expect("bootstrap");

        assert_eq!(app.dispatch_mode, "self_invoke");
        assert_eq!(app.llm_provider, LlmProvider::Gateway);
    }

    #[tokio::test]
    async fn wired_router_serves_health() {
        let app = bootstrap(LoadOptions { overrides: overrides(), ..LoadOptions::default() })
            .expect("bootstrap");

        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["ok"], true);
        assert_eq!(payload["llm_provider"], "gateway");
    }
}
