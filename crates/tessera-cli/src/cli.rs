use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Tessera: path-tree documents with replicated transaction logs",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
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
    /// Generate sortable node keys
    Keys(KeysArgs),
    /// Replay a transaction timeline and print the resulting tree
    Replay(ReplayArgs),
    /// Run a hub and child replicas in-process and check they converge
    Simulate(SimulateArgs),
}

#[derive(Args)]
pub struct KeysArgs {
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// JSON file holding an array of transactions
    pub timeline: PathBuf,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of child replicas (defaults to the config value)
    #[arg(long)]
    pub replicas: Option<usize>,
    /// Scenes each replica creates (defaults to the config value)
    #[arg(long)]
    pub writes: Option<usize>,
}
