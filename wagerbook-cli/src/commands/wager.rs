use super::{confirm, print_wager, wager_table};
use bitcoin::Amount;
use clap::Subcommand;
use wagerbook_core::WagerbookError;
use wagerbook_rps::{Choice, Result, WagerId, WagerService};

#[derive(Subcommand)]
pub enum WagerCommands {
    /// Open a wager by escrowing a stake
    Create {
        /// Owner identity
        owner: String,
        /// rock, paper or scissors
        choice: Choice,
        /// Stake in satoshis
        stake: u64,
    },
    /// Join an open wager; it settles immediately
    Join {
        /// Owner identity
        owner: String,
        /// Wager ID
        wager_id: WagerId,
        /// rock, paper or scissors
        choice: Choice,
        /// Stake in satoshis, must match the wager
        stake: u64,
    },
    /// List active and finished wagers
    List {
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Show one wager
    Show {
        /// Wager ID
        wager_id: WagerId,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Retry the payout of a wager whose payout failed
    Settle {
        /// Wager ID
        wager_id: WagerId,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_wager_command(cmd: WagerCommands, service: &WagerService) -> Result<()> {
    match cmd {
        WagerCommands::Create {
            owner,
            choice,
            stake,
        } => {
            let id = service
                .create_wager(&owner, choice, Amount::from_sat(stake))
                .await?;
            println!("Wager created");
            println!("  ID: {}", id);
            println!("  Stake: {} sats", stake);
            println!("Share the ID so an opponent can join.");
        }

        WagerCommands::Join {
            owner,
            wager_id,
            choice,
            stake,
        } => {
            let settlement = service
                .join_wager(wager_id, &owner, choice, Amount::from_sat(stake))
                .await?;
            match settlement.winner() {
                Some(winner) => println!(
                    "{} wins {} sats",
                    winner,
                    settlement.wager.pot().to_sat()
                ),
                None => println!("Tie - both stakes returned"),
            }
            println!();
            print_wager(&settlement.wager);
        }

        WagerCommands::List { json } => {
            let listing = service.list_wagers();
            if json {
                println!("{}", to_json(&listing)?);
                return Ok(());
            }
            if listing.active.is_empty() && listing.finished.is_empty() {
                println!("No wagers found.");
                println!("Open one with: wagerbook wager create <owner> <choice> <stake>");
                return Ok(());
            }

            println!("Active wagers:");
            println!("{}", wager_table(&listing.active));
            println!("Finished wagers:");
            println!("{}", wager_table(&listing.finished));
        }

        WagerCommands::Show { wager_id, json } => {
            let wager = service.wager(wager_id)?;
            if json {
                println!("{}", to_json(&wager)?);
            } else {
                print_wager(&wager);
            }
        }

        WagerCommands::Settle { wager_id, yes } => {
            let wager = service.wager(wager_id)?;
            print_wager(&wager);
            if !confirm("Retry payout for this wager?", yes)? {
                println!("Cancelled.");
                return Ok(());
            }

            let settlement = service.settle(wager_id).await?;
            println!("Wager {} settled ({})", wager_id, settlement.outcome);
        }
    }

    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| WagerbookError::from(e).into())
}
