use eli5_agent::{client_from_config, Explainer};
use eli5_core::{
    config::{AppConfig, LlmProvider, LoadOptions},
    errors::FailureNotice,
};

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_RUNTIME};

/// One-off explanation of `text`, printed as the bot would phrase it.
pub fn run(text: &str) -> CommandResult {
    let text = text.trim();
    if text.is_empty() {
        return CommandResult::failure(
            "explain",
            "input_validation",
            FailureNotice::NothingToExplain.user_message(),
            EXIT_CONFIG,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "explain",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    if config.llm.provider() == LlmProvider::Unconfigured {
        return CommandResult::failure(
            "explain",
            "llm_unconfigured",
            FailureNotice::NoProvider.user_message(),
            EXIT_CONFIG,
        );
    }

    let explainer = match client_from_config(&config.llm)
        .map_err(|error| error.to_string())
        .and_then(|client| Explainer::new(client).map_err(|error| error.to_string()))
    {
        Ok(explainer) => explainer,
        Err(message) => {
            return CommandResult::failure("explain", "llm_client", message, EXIT_RUNTIME);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "explain",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    match runtime.block_on(explainer.explain(text, &[])) {
        Ok(explanation) => CommandResult::text(explanation),
        Err(error) => CommandResult::failure("explain", "llm_request", error.to_string(), EXIT_RUNTIME),
    }
}
