use std::process::ExitCode;

fn main() -> ExitCode {
    eli5_cli::run()
}
