use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vouch",
    about = "Vouch: anchor credential batches and audit their ledger history",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Reconstructor configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the canonical digest of a credential
    Hash(HashArgs),
    /// Build a Merkle batch and write one inclusion receipt per credential
    Batch(BatchArgs),
    /// Verify an inclusion receipt
    Verify(VerifyArgs),
    /// Run issue, transfer, and revoke on a simulated ledger and print the audit trail
    Simulate(SimulateArgs),
    /// Show the effective reconstructor configuration
    Config,
}

#[derive(Args)]
pub struct HashArgs {
    pub credential: PathBuf,
}

#[derive(Args)]
pub struct BatchArgs {
    #[arg(required = true)]
    pub credentials: Vec<PathBuf>,
    /// Batch identifier; a fresh UUIDv7 when omitted
    #[arg(long)]
    pub id: Option<String>,
    /// Directory receiving the receipts and the batch manifest
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub receipt: PathBuf,
    /// Expected root; defaults to the root recorded in the receipt
    #[arg(long)]
    pub root: Option<String>,
    /// Credential file the receipt is expected to cover
    #[arg(long)]
    pub credential: Option<PathBuf>,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of credentials in the simulated batch
    #[arg(short = 'n', long, default_value = "4")]
    pub count: usize,
}
