//! Wagerbook core - custodial wallets on an external ledger
//!
//! Holds everything that touches money but knows nothing about games:
//! the ledger client and its timeouts, custodial signing keys, cached
//! wallet balances, reconciliation against the ledger and snapshot
//! persistence.

pub mod config;
pub mod custody;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod storage;
pub mod types;
pub mod wallet;

pub use config::{LedgerConfig, VaultConfig, WagerConfig, WagerbookConfig};
pub use custody::{KeyVault, KeypairSigner, TransferSigner};
pub use error::{Result, WagerbookError};
pub use ledger::{HttpLedger, Ledger, LedgerClient, MemoryLedger};
pub use reconcile::{BalanceReconciler, Reconciliation};
pub use storage::{JsonFileSnapshotStore, Snapshot, SnapshotStore, SqliteSnapshotStore};
pub use types::{Address, SignedTransfer, TransferHandle, TransferReceipt, TransferRequest, TransferStatus};
pub use wallet::{Wallet, WalletGuard, WalletStore};

pub use ::bitcoin::Amount;
pub use ::bitcoin::Network;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_custodial_deposit_is_reconciled() {
        let vault = KeyVault::in_memory("pass", &VaultConfig { kdf_rounds: 1_000 }, Network::Regtest)
            .await
            .unwrap();
        let signer = vault.create_key("alice").await.unwrap();

        let memory = Arc::new(MemoryLedger::new());
        memory.deposit(signer.address(), Amount::from_sat(5_000));

        let wallets = WalletStore::new();
        wallets
            .insert(Wallet::new("alice", signer.address().clone()))
            .unwrap();

        let reconciler = BalanceReconciler::new(Ledger::new(memory, LedgerConfig::default()));
        let guard = wallets.lock("alice").await.unwrap();
        let result = reconciler.reconcile(&guard).await.unwrap();

        assert_eq!(result.incoming, Amount::from_sat(5_000));
        assert_eq!(wallets.get("alice").unwrap().last_balance, Amount::from_sat(5_000));
    }
}
