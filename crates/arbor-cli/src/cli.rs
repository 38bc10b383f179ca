use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: branching, review and conflict core of a terminology server",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Core configuration file (TOML).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a scenario file against a fresh in-memory core
    Run(RunArgs),
    /// Validate a configuration and print the effective settings
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Scenario files, run one after another, each on a fresh core
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,
    /// Keep going after a step fails
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Args)]
pub struct ConfigArgs {}
