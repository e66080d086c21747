use super::{print_wager, wager_table};
use bitcoin::{Amount, Network};
use std::sync::Arc;
use std::time::Duration;
use wagerbook_core::{KeyVault, Ledger, LedgerConfig, MemoryLedger, SqliteSnapshotStore, VaultConfig, WagerConfig};
use wagerbook_rps::{BroadcastNotifier, Choice, Result, WagerError, WagerEvent, WagerService};

/// Two players, one wager, against an in-process ledger. Nothing touches disk.
pub async fn run_demo(stake: u64) -> Result<()> {
    let stake = Amount::from_sat(stake);
    let funding = stake
        .checked_mul(3)
        .ok_or_else(|| WagerError::invalid_input("Stake is too large to fund the demo"))?;

    let memory = Arc::new(MemoryLedger::new());
    memory.set_confirmation_delay(Duration::from_millis(200));

    let ledger_config = LedgerConfig {
        gateway_url: "memory".to_string(),
        confirm_poll_interval: Duration::from_millis(50),
        ..LedgerConfig::default()
    };
    let vault = KeyVault::in_memory("demo", &VaultConfig { kdf_rounds: 1_000 }, Network::Regtest).await?;
    let store = SqliteSnapshotStore::in_memory().await?;
    let notifier = Arc::new(BroadcastNotifier::new(64));
    let mut events = notifier.subscribe();

    let service = WagerService::open(
        Arc::new(vault),
        Ledger::new(memory.clone(), ledger_config),
        Arc::new(store),
        notifier,
        &WagerConfig::default(),
    )
    .await?;

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                WagerEvent::BalanceUpdated { owner, balance } => {
                    println!("  [event] {} {} -> {} sats", event.name(), owner, balance.to_sat())
                }
                WagerEvent::WagerDeleted { wager_id } => {
                    println!("  [event] {} {}", event.name(), wager_id)
                }
                WagerEvent::WagerCreated { wager }
                | WagerEvent::WagerJoined { wager }
                | WagerEvent::WagerResolved { wager } => {
                    println!("  [event] {} {} ({})", event.name(), wager.id, wager.state)
                }
            }
        }
    });

    println!("Registering alice and bob...");
    let alice = service.register_wallet("alice").await?;
    let bob = service.register_wallet("bob").await?;
    memory.deposit(&alice.address, funding);
    memory.deposit(&bob.address, funding);
    println!("Deposited {} sats to each", funding.to_sat());

    println!("alice opens a wager with rock...");
    let id = service.create_wager("alice", Choice::Rock, stake).await?;

    println!("bob joins with scissors...");
    let settlement = service.join_wager(id, "bob", Choice::Scissors, stake).await?;

    println!();
    print_wager(&settlement.wager);
    println!();
    println!("{}", wager_table(&service.list_wagers().finished));
    for wallet in service.wallets() {
        println!("{}: {} sats", wallet.owner, wallet.last_balance.to_sat());
    }

    // Dropping the service closes the channel once every event is printed.
    drop(service);
    if let Err(e) = printer.await {
        tracing::warn!("Event printer stopped early: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagerbook_rps::ErrorKind;

    #[tokio::test]
    async fn test_oversized_stake_is_rejected() {
        let err = run_demo(u64::MAX).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_demo_runs_to_completion() {
        run_demo(1_000).await.unwrap();
    }
}
