use std::env;
use std::fs;
use std::path::Path;

use eli5_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.push(format!("- llm.provider = {} (derived from keys)", config.llm.provider().as_str()));

    CommandResult::text(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new(
            "slack.bot_token",
            redact_token(config.slack.bot_token.expose_secret()),
            &["ELI5_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        ),
        Field::new(
            "slack.signing_secret",
            redact_secret(Some(&config.slack.signing_secret)),
            &["ELI5_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"],
        ),
        Field::new("slack.api_base_url", config.slack.api_base_url.as_str(), &["ELI5_SLACK_API_BASE_URL"]),
        Field::new(
            "slack.trigger_emojis",
            config.slack.trigger_emojis.join(","),
            &["ELI5_SLACK_TRIGGER_EMOJIS"],
        ),
        Field::new(
            "slack.signature_tolerance_secs",
            config.slack.signature_tolerance_secs.to_string(),
            &["ELI5_SLACK_SIGNATURE_TOLERANCE_SECS"],
        ),
        Field::new(
            "llm.gateway_api_key",
            redact_secret(config.llm.gateway_api_key.as_ref()),
            &["ELI5_LLM_GATEWAY_API_KEY", "AI_GATEWAY_API_KEY"],
        ),
        Field::new(
            "llm.gateway_base_url",
            config.llm.gateway_base_url.as_str(),
            &["ELI5_LLM_GATEWAY_BASE_URL", "AI_GATEWAY_BASE_URL"],
        ),
        Field::new(
            "llm.gateway_model",
            config.llm.gateway_model.as_str(),
            &["ELI5_LLM_GATEWAY_MODEL", "AI_GATEWAY_MODEL"],
        ),
        Field::new(
            "llm.anthropic_api_key",
            redact_secret(config.llm.anthropic_api_key.as_ref()),
            &["ELI5_LLM_ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"],
        ),
        Field::new(
            "llm.anthropic_base_url",
            config.llm.anthropic_base_url.as_str(),
            &["ELI5_LLM_ANTHROPIC_BASE_URL"],
        ),
        Field::new("llm.anthropic_model", config.llm.anthropic_model.as_str(), &["ELI5_LLM_ANTHROPIC_MODEL"]),
        Field::new("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["ELI5_LLM_TIMEOUT_SECS"]),
        Field::new("llm.max_retries", config.llm.max_retries.to_string(), &["ELI5_LLM_MAX_RETRIES"]),
        Field::new("server.bind_address", config.server.bind_address.as_str(), &["ELI5_SERVER_BIND_ADDRESS"]),
        Field::new("server.port", config.server.port.to_string(), &["ELI5_SERVER_PORT", "PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["ELI5_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "server.dispatch_mode",
            format!("{:?}", config.server.dispatch_mode),
            &["ELI5_SERVER_DISPATCH_MODE"],
        ),
        Field::new(
            "server.public_url",
            config.server.public_url.as_deref().unwrap_or("<unset>"),
            &["ELI5_SERVER_PUBLIC_URL"],
        ),
        Field::new(
            "server.worker_timeout_secs",
            config.server.worker_timeout_secs.to_string(),
            &["ELI5_SERVER_WORKER_TIMEOUT_SECS"],
        ),
        Field::new(
            "server.handoff_timeout_secs",
            config.server.handoff_timeout_secs.to_string(),
            &["ELI5_SERVER_HANDOFF_TIMEOUT_SECS"],
        ),
        Field::new("logging.level", config.logging.level.as_str(), &["ELI5_LOGGING_LEVEL", "ELI5_LOG_LEVEL"]),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ELI5_LOGGING_FORMAT", "ELI5_LOG_FORMAT"],
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "<redacted>".to_string(),
        Some(_) => "<empty>".to_string(),
        None => "<unset>".to_string(),
    }
}
