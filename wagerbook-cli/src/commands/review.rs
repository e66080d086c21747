use super::confirm;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use uuid::Uuid;
use wagerbook_rps::{Result, WagerError, WagerService};

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List transfers waiting for operator review
    List,
    /// Dismiss a reviewed item
    Dismiss {
        /// Review item ID
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_review_command(cmd: ReviewCommands, service: &WagerService) -> Result<()> {
    match cmd {
        ReviewCommands::List => {
            let items = service.review_items();
            if items.is_empty() {
                println!("Nothing under review.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec![
                "ID", "Kind", "Wager", "Owner", "Amount (sats)", "Transfer", "Filed", "Reason",
            ]);
            for item in items {
                table.add_row(vec![
                    item.id.to_string(),
                    item.kind.to_string(),
                    item.wager_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    item.owner.unwrap_or_else(|| "-".to_string()),
                    item.amount.to_sat().to_string(),
                    item.transfer_handle.unwrap_or_else(|| "-".to_string()),
                    item.filed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    item.reason,
                ]);
            }
            println!("{}", table);
        }

        ReviewCommands::Dismiss { id, yes } => {
            let id = Uuid::parse_str(id.trim())
                .map_err(|e| WagerError::invalid_input(format!("Invalid review id: {}", e)))?;
            if !confirm(
                "Dismiss this item? Only do so once the ledger has been checked.",
                yes,
            )? {
                println!("Cancelled.");
                return Ok(());
            }

            let item = service.dismiss_review(id).await?;
            println!("Dismissed {} ({})", item.id, item.kind);
        }
    }

    Ok(())
}
