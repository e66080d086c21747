use super::confirm;
use bitcoin::Amount;
use clap::Subcommand;
use wagerbook_rps::{Result, WagerService};

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Register a custodial wallet
    Register {
        /// Owner identity
        owner: String,
    },
    /// Show wallet information, picking up new deposits
    Info {
        /// Owner identity
        owner: String,
    },
    /// Compare cached and ledger balances
    Balance {
        /// Owner identity
        owner: String,
    },
    /// Send funds out of a custodial wallet
    Withdraw {
        /// Owner identity
        owner: String,
        /// Destination ledger address
        address: String,
        /// Amount in satoshis
        amount: u64,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_wallet_command(cmd: WalletCommands, service: &WagerService) -> Result<()> {
    match cmd {
        WalletCommands::Register { owner } => {
            let wallet = service.register_wallet(&owner).await?;
            println!("Wallet registered for '{}'", wallet.owner);
            println!("  Deposit address: {}", wallet.address);
        }

        WalletCommands::Info { owner } => {
            let info = service.wallet_info(&owner).await?;
            if let Some(notice) = info.deposit_notice() {
                println!("{}", notice);
            }
            println!("Wallet '{}'", info.wallet.owner);
            println!("  Address: {}", info.wallet.address);
            println!("  Balance: {} sats", info.wallet.last_balance.to_sat());
            println!(
                "  Updated: {}",
                info.wallet.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        WalletCommands::Balance { owner } => {
            let on_ledger = service.ledger_balance(&owner).await?;
            let cached = service
                .wallets()
                .into_iter()
                .find(|w| w.owner == owner)
                .map(|w| w.last_balance)
                .unwrap_or(Amount::ZERO);

            println!("Balance for '{}':", owner);
            println!("  Ledger: {} sats", on_ledger.to_sat());
            println!("  Cached: {} sats", cached.to_sat());
            if on_ledger > cached {
                println!("  Run 'wagerbook wallet info {}' to pick up the difference", owner);
            }
        }

        WalletCommands::Withdraw {
            owner,
            address,
            amount,
            yes,
        } => {
            let amount = Amount::from_sat(amount);
            let prompt = format!("Send {} sats from '{}' to {}?", amount.to_sat(), owner, address);
            if !confirm(&prompt, yes)? {
                println!("Cancelled.");
                return Ok(());
            }

            let balance = service.withdraw(&owner, &address, amount).await?;
            println!("Withdrawal confirmed");
            println!("  Remaining balance: {} sats", balance.to_sat());
        }
    }

    Ok(())
}
