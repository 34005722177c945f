pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "eli5",
    about = "ELI5 Slack bot operator CLI",
    long_about = "Inspect configuration, check readiness, and try explanations without going through Slack.",
    after_help = "Examples:\n  eli5 doctor --json\n  eli5 config\n  eli5 explain \"Our p99 regressed after the GC change\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack credentials, and LLM provider readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Explain a piece of text with the configured LLM provider")]
    Explain {
        #[arg(help = "Text to explain, as it would appear in a Slack message")]
        text: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Explain { text } => commands::explain::run(&text),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
