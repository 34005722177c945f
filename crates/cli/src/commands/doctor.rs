use eli5_core::config::{AppConfig, DispatchMode, LlmProvider, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_OK};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_CONFIG } else { EXIT_OK };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_credentials(&config));
            checks.push(check_llm_provider(&config));
            checks.push(check_dispatch_mode(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["slack_credentials", "llm_provider", "dispatch_mode"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready, with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_slack_credentials(config: &AppConfig) -> DoctorCheck {
    let secret_len = config.slack.signing_secret.expose_secret().trim().len();
    DoctorCheck {
        name: "slack_credentials",
        status: CheckStatus::Pass,
        details: format!(
            "bot token has the xoxb- prefix; signing secret is {secret_len} characters; api at {}",
            config.slack.api_base_url
        ),
    }
}

fn check_llm_provider(config: &AppConfig) -> DoctorCheck {
    match config.llm.provider() {
        LlmProvider::Gateway => DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Pass,
            details: format!(
                "gateway `{}` with model `{}`",
                config.llm.gateway_base_url, config.llm.gateway_model
            ),
        },
        LlmProvider::Anthropic => DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Pass,
            details: format!("anthropic with model `{}`", config.llm.anthropic_model),
        },
        LlmProvider::Unconfigured => DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Warn,
            details: "no provider key set; users will be told to set AI_GATEWAY_API_KEY or ANTHROPIC_API_KEY"
                .to_string(),
        },
    }
}

fn check_dispatch_mode(config: &AppConfig) -> DoctorCheck {
    let details = match (config.server.dispatch_mode, config.server.public_url.as_deref()) {
        (DispatchMode::SelfInvoke, Some(public_url)) => format!(
            "self_invoke via {public_url}/slack/lazy (handoff {}s, worker {}s)",
            config.server.handoff_timeout_secs, config.server.worker_timeout_secs
        ),
        _ => "background tasks in the server process".to_string(),
    };
    DoctorCheck { name: "dispatch_mode", status: CheckStatus::Pass, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
