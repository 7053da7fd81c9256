use cardwall_auth::ProgressState;
use colored::Colorize;

use crate::cli::OutputFormat;

pub fn print_state(state: &ProgressState, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(state) {
            Ok(line) => println!("{line}"),
            Err(e) => print_error(&format!("Failed to encode state: {e}")),
        },
        OutputFormat::Text => match state {
            ProgressState::FlowFinished => print_success("Authentication finished"),
            ProgressState::Failed { outcome } => {
                print_error(&format!("{outcome} ({})", outcome.code()));
            }
            other => println!("{} {}", "→".cyan(), other),
        },
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}
