mod cli;
mod observability;
mod output;
mod scenario;
mod simulated;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use cardwall_auth::config::loader::load_config;
use cardwall_auth::{
    CardwallConfig, HealthCardCredentials, Orchestrator, ProgressState, ProgressStream,
    SecureElementCredentials,
};
use cli::{CardArgs, Cli, Commands, ConfigCommands, OutputFormat};
use output::{print_error, print_state};
use scenario::Scenario;
use simulated::{SimulatedIdp, SimulatedReader, SimulatedSecureElement};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    observability::init_tracing_with_level(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
    );

    match &cli.command {
        Commands::Authenticate(args) => {
            let scenario = Scenario::load(&args.scenario)?;
            let stream = orchestrator(&scenario, config).authenticate_with_health_card(
                credentials(args, &scenario),
                SimulatedReader::new(&scenario.card),
            );
            Ok(render(stream, format).await)
        }
        Commands::Pair(args) => {
            let scenario = Scenario::load(&args.scenario)?;
            let stream = orchestrator(&scenario, config).pair_with_secure_element(
                credentials(args, &scenario),
                SimulatedReader::new(&scenario.card),
            );
            Ok(render(stream, format).await)
        }
        Commands::AltAuth(args) => {
            let scenario = Scenario::load(&args.scenario)?;
            let stream = orchestrator(&scenario, config)
                .authenticate_with_secure_element(SecureElementCredentials::new(&args.profile));
            Ok(render(stream, format).await)
        }
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => {
                show_config(&config, format)?;
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn credentials(args: &CardArgs, scenario: &Scenario) -> HealthCardCredentials {
    HealthCardCredentials::new(
        args.can.as_deref().unwrap_or(&scenario.card.can),
        args.pin.as_deref().unwrap_or(&scenario.card.pin),
    )
}

fn orchestrator(scenario: &Scenario, config: CardwallConfig) -> Orchestrator {
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    Orchestrator::new(
        Arc::new(SimulatedIdp::new(scenario)),
        Arc::new(SimulatedSecureElement::new(&scenario.secure_element)),
    )
    .with_config(config)
    .with_cancellation(token)
}

/// Prints every state and maps the terminal one to the exit code.
async fn render(mut stream: ProgressStream, format: OutputFormat) -> ExitCode {
    let mut last = None;
    while let Some(state) = stream.next().await {
        print_state(&state, format);
        last = Some(state);
    }
    match last {
        Some(ProgressState::FlowFinished) => ExitCode::SUCCESS,
        Some(ProgressState::Failed { .. }) => ExitCode::from(2),
        _ => {
            print_error("Cancelled");
            ExitCode::from(130)
        }
    }
}

fn show_config(config: &CardwallConfig, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Text => toml::to_string_pretty(config)?,
        OutputFormat::Json => serde_json::to_string_pretty(config)?,
    };
    println!("{rendered}");
    Ok(())
}
