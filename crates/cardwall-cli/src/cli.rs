use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cardwall")]
#[command(about = "Cardwall: run health card authentication flows against a simulated card and IdP")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Orchestrator config file (TOML)
    #[arg(short, long, global = true, env = "CARDWALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authenticate with the health card
    Authenticate(CardArgs),
    /// Authenticate with the health card and pair a secure-element key
    Pair(CardArgs),
    /// Authenticate with an already-paired secure-element key
    AltAuth(AltAuthArgs),
    /// Inspect orchestrator configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct CardArgs {
    /// Scenario file describing the simulated card, IdP and secure element
    #[arg(short, long)]
    pub scenario: PathBuf,
    /// Card access number (defaults to the scenario's card)
    #[arg(long)]
    pub can: Option<String>,
    /// PIN (defaults to the scenario's card)
    #[arg(long)]
    pub pin: Option<String>,
}

#[derive(clap::Args)]
pub struct AltAuthArgs {
    /// Scenario file describing the simulated IdP and secure element
    #[arg(short, long)]
    pub scenario: PathBuf,
    /// Profile whose paired key authenticates
    #[arg(long)]
    pub profile: String,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
}
