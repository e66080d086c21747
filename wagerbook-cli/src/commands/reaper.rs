use chrono::Utc;
use clap::Subcommand;
use wagerbook_rps::{Result, WagerService};

#[derive(Subcommand)]
pub enum ReaperCommands {
    /// Sweep expired wagers once
    Once,
    /// Keep sweeping on the configured interval until Ctrl-C
    Run,
}

pub async fn handle_reaper_command(cmd: ReaperCommands, service: &WagerService) -> Result<()> {
    match cmd {
        ReaperCommands::Once => {
            let removed = service.reap(Utc::now()).await?;
            if removed.is_empty() {
                println!("No expired wagers.");
            } else {
                println!("Removed {} wagers:", removed.len());
                for id in removed {
                    println!("  {}", id);
                }
            }
        }

        ReaperCommands::Run => {
            let handle = service.spawn_reaper();
            println!("Reaper running. Press Ctrl-C to stop.");

            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            }

            handle.shutdown().await;
            println!("Reaper stopped.");
        }
    }

    Ok(())
}
