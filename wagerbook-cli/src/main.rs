mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wagerbook_rps::{ErrorKind, WagerError};

#[derive(Parser)]
#[command(name = "wagerbook")]
#[command(about = "Wagerbook - two-player rock/paper/scissors wagers with custodial escrow")]
#[command(version)]
struct Cli {
    /// Data directory for keys and state
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to <data-dir>/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Custodial wallet commands
    #[command(subcommand)]
    Wallet(commands::WalletCommands),

    /// Wager commands
    #[command(subcommand)]
    Wager(commands::WagerCommands),

    /// Operator review queue
    #[command(subcommand)]
    Review(commands::ReviewCommands),

    /// Cleanup of resolved wagers
    #[command(subcommand)]
    Reaper(commands::ReaperCommands),

    /// Play one wager against an in-memory ledger
    Demo {
        /// Stake in satoshis
        #[arg(long, default_value_t = 10_000)]
        stake: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "wagerbook={},wagerbook_core={},wagerbook_rps={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = cli.data_dir;
    let config_path = cli.config;

    let result = match cli.command {
        Commands::Demo { stake } => commands::demo::run_demo(stake).await,
        Commands::Wallet(cmd) => {
            let app = open_app(data_dir, config_path).await?;
            commands::handle_wallet_command(cmd, &app.service).await
        }
        Commands::Wager(cmd) => {
            let app = open_app(data_dir, config_path).await?;
            commands::handle_wager_command(cmd, &app.service).await
        }
        Commands::Review(cmd) => {
            let app = open_app(data_dir, config_path).await?;
            commands::handle_review_command(cmd, &app.service).await
        }
        Commands::Reaper(cmd) => {
            let app = open_app(data_dir, config_path).await?;
            commands::handle_reaper_command(cmd, &app.service).await
        }
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}

async fn open_app(
    data_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<config::App> {
    let data_dir = data_dir.unwrap_or_else(config::default_data_dir);

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir).await?;

    let app = config::App::open(&data_dir, config_path).await?;
    tracing::debug!(
        "Using ledger gateway {} on {}",
        app.config.ledger.gateway_url,
        app.config.network
    );
    Ok(app)
}

fn report(e: &WagerError) {
    if e.is_under_review() {
        eprintln!("Pending / under review [{}]: {}", e.kind(), e);
        eprintln!("Funds are accounted for; see 'wagerbook review list'");
        return;
    }

    match e {
        WagerError::InsufficientBalance {
            need, available, ..
        } => {
            eprintln!("Error [{}]: Insufficient balance", e.kind());
            eprintln!("Need: {} sats, Available: {} sats", need, available);
        }
        WagerError::LedgerTransferFailed {
            submitted, handle, ..
        } => {
            eprintln!("Error [{}]: {}", e.kind(), e);
            if *submitted {
                eprintln!(
                    "The ledger saw the transfer ({}) and reported it failed",
                    handle.as_deref().unwrap_or("no handle")
                );
            } else {
                eprintln!("Nothing reached the ledger");
            }
        }
        _ if e.kind() == ErrorKind::WagerNotFound => {
            eprintln!("Error [{}]: {}", e.kind(), e);
            eprintln!("Use 'wagerbook wager list' to see open wagers");
        }
        _ => eprintln!("Error [{}]: {}", e.kind(), e),
    }
}
