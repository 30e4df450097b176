//! Escrow lifecycle client CLI.
//!
//! ```text
//! escrow-client deploy --arbiter 0x.. --beneficiary 0x.. --amount 1.5
//! escrow-client lookup 0x..
//! escrow-client approve 0x..
//! ```
//!
//! The signer is read from `ESCROW_PRIVATE_KEY`; without it only `lookup`
//! is available.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use escrow_client::blockchain::{BlockchainClient, Wallet};
use escrow_client::config::loader::load_or_default;
use escrow_client::escrow::{ContractArtifact, EscrowSession};
use escrow_client::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "escrow-client")]
#[command(about = "Deploy, inspect and approve two-party escrow contracts", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a new escrow funded with the given amount of ether
    Deploy {
        #[arg(long)]
        arbiter: String,
        #[arg(long)]
        beneficiary: String,
        /// Deposit in ether, e.g. 1.5
        #[arg(long)]
        amount: String,
    },
    /// Show the state of an existing escrow
    Lookup { address: String },
    /// Release the funds of an escrow (signer must be the arbiter)
    Approve { address: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_or_default(cli.config.as_deref())?;
    init_logging(&config.observability);

    let ledger = Arc::new(BlockchainClient::new(config.blockchain.clone()).await?);
    let mut session = EscrowSession::new(ledger);

    if matches!(cli.command, Commands::Deploy { .. }) {
        let artifact = ContractArtifact::load(Path::new(&config.contract.artifact_path))?;
        session = session.with_artifact(artifact);
    }

    match Wallet::from_env(config.blockchain.chain_id) {
        Ok(wallet) => session.connect_signer(wallet),
        Err(e) => tracing::debug!(error = %e, "No signer configured"),
    }

    match cli.command {
        Commands::Deploy {
            arbiter,
            beneficiary,
            amount,
        } => {
            let record = session.deploy(&arbiter, &beneficiary, &amount).await?;
            print(&record, cli.json)?;
        }
        Commands::Lookup { address } => match session.lookup(&address).await? {
            Some(record) => print(&record, cli.json)?,
            None => println!("No escrow found at {}", address.trim()),
        },
        Commands::Approve { address } => {
            if session.lookup(&address).await?.is_none() {
                println!("No escrow found at {}", address.trim());
                return Ok(());
            }

            let mut changes = session.subscribe();
            let watcher = tokio::spawn(async move {
                if let Ok(change) = changes.recv().await {
                    tracing::info!(
                        address = %change.address,
                        released = ?change.released,
                        "Escrow approved"
                    );
                }
            });

            let outcome = session.approve(&address).await?;
            watcher.abort();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            if let Some(record) = session.lookup(&address).await? {
                print(&record, cli.json)?;
            }
        }
    }

    Ok(())
}

fn print<T: Serialize + std::fmt::Display>(value: &T, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}
