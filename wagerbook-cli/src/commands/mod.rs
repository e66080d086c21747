pub mod demo;
pub mod reaper;
pub mod review;
pub mod wager;
pub mod wallet;

pub use reaper::{handle_reaper_command, ReaperCommands};
pub use review::{handle_review_command, ReviewCommands};
pub use wager::{handle_wager_command, WagerCommands};
pub use wallet::{handle_wallet_command, WalletCommands};

use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use wagerbook_core::WagerbookError;
use wagerbook_rps::{Result, Wager, WagerError};

/// Ask before an operator action unless `--yes` was given.
pub(crate) fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| WagerError::Core(WagerbookError::internal(format!("Prompt failed: {}", e))))
}

pub(crate) fn wager_table(wagers: &[Wager]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Creator", "Joiner", "Stake (sats)", "State", "Result"]);

    for wager in wagers {
        let result = match &wager.result {
            Some(result) => match &result.winner {
                Some(winner) => format!("{} won", winner),
                None => "tie".to_string(),
            },
            None => "-".to_string(),
        };
        table.add_row(vec![
            wager.id.to_string(),
            wager.creator.clone(),
            wager.joiner.clone().unwrap_or_else(|| "-".to_string()),
            wager.stake.to_sat().to_string(),
            wager.state.to_string(),
            result,
        ]);
    }
    table
}

pub(crate) fn print_wager(wager: &Wager) {
    println!("Wager {}", wager.id);
    println!("  State: {}", wager.state);
    println!("  Stake: {} sats (pot {} sats)", wager.stake.to_sat(), wager.pot().to_sat());
    println!("  Creator: {} ({})", wager.creator, wager.creator_choice);
    match (&wager.joiner, wager.joiner_choice) {
        (Some(joiner), Some(choice)) => println!("  Joiner: {} ({})", joiner, choice),
        (Some(joiner), None) => println!("  Joiner: {}", joiner),
        _ => println!("  Joiner: -"),
    }
    if let Some(result) = &wager.result {
        println!("  Outcome: {}", result.outcome);
        if let Some(winner) = &result.winner {
            println!("  Winner: {}", winner);
        }
    }
    for leg in &wager.payouts {
        println!(
            "  Payout: {} sats to {} [{:?}] {}",
            leg.amount.to_sat(),
            leg.recipient,
            leg.status,
            leg.handle.as_deref().unwrap_or("")
        );
    }
    println!("  Created: {}", wager.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(at) = wager.resolved_at {
        println!("  Resolved: {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
}
