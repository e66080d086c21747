//! Entry points for an authenticated caller.

use crate::error::{Result, WagerError};
use crate::escrow::EscrowOrchestrator;
use crate::events::{Notifier, WagerEvent};
use crate::journal::{EngineState, Journal};
use crate::outcome::{resolve, Choice};
use crate::reaper::{ReaperHandle, WagerReaper};
use crate::review::{ReviewItem, ReviewKind};
use crate::settle::SettlementResult;
use crate::wager::{Wager, WagerId, WagerState};
use bitcoin::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use wagerbook_core::{
    Address, KeyVault, Ledger, SnapshotStore, TransferSigner, WagerConfig, Wallet, WagerbookError,
};

/// Vault owner holding escrowed stakes.
pub const SETTLEMENT_OWNER: &str = "settlement";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub wallet: Wallet,
    /// Deposit detected by this call; zero if none.
    pub incoming: Amount,
}

impl WalletInfo {
    pub fn deposit_notice(&self) -> Option<String> {
        (self.incoming > Amount::ZERO)
            .then(|| format!("Received {} sats", self.incoming.to_sat()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WagerListing {
    pub active: Vec<Wager>,
    pub finished: Vec<Wager>,
}

pub struct WagerService {
    journal: Arc<Journal>,
    escrow: EscrowOrchestrator,
    reaper: Arc<WagerReaper>,
    vault: Arc<KeyVault>,
    settlement: Arc<dyn TransferSigner>,
}

impl WagerService {
    /// Restore the last snapshot (if any) and wire up the engine.
    pub async fn open(
        vault: Arc<KeyVault>,
        ledger: Ledger,
        store: Arc<dyn SnapshotStore<EngineState>>,
        notifier: Arc<dyn Notifier>,
        config: &WagerConfig,
    ) -> Result<Self> {
        let settlement = vault.signer_or_create(SETTLEMENT_OWNER).await?;
        let journal = Arc::new(Journal::new(store, notifier));
        journal.restore().await?;

        let reaper = Arc::new(WagerReaper::new(
            journal.clone(),
            config.retention,
            config.reap_interval,
        )?);
        let escrow = EscrowOrchestrator::new(journal.clone(), vault.clone(), ledger, settlement.clone());

        tracing::info!(
            "Wager service ready, settlement account {}",
            settlement.address()
        );

        Ok(Self {
            journal,
            escrow,
            reaper,
            vault,
            settlement,
        })
    }

    pub fn settlement_address(&self) -> &Address {
        self.settlement.address()
    }

    pub async fn register_wallet(&self, owner: &str) -> Result<Wallet> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(WagerError::invalid_input("Owner must not be empty"));
        }
        if owner == SETTLEMENT_OWNER {
            return Err(WagerError::invalid_input(format!("'{}' is reserved", owner)));
        }
        if self.journal.wallets().contains(owner) {
            return Err(WagerbookError::WalletExists {
                owner: owner.to_string(),
            }
            .into());
        }

        let signer = self.vault.signer_or_create(owner).await?;
        let wallet = Wallet::new(owner, signer.address().clone());
        self.journal.wallets().insert(wallet.clone())?;
        self.journal
            .commit(vec![WagerEvent::BalanceUpdated {
                owner: owner.to_string(),
                balance: wallet.last_balance,
            }])
            .await?;

        tracing::info!("Registered wallet for '{}' at {}", owner, wallet.address);
        Ok(wallet)
    }

    /// Cached wallet view after reconciling with the ledger.
    pub async fn wallet_info(&self, owner: &str) -> Result<WalletInfo> {
        let guard = self.journal.wallets().lock(owner).await?;
        let reconciliation = self.escrow.refresh(&guard).await?;
        Ok(WalletInfo {
            wallet: guard.wallet(),
            incoming: reconciliation.incoming,
        })
    }

    /// Raw ledger balance, without touching the cache.
    pub async fn ledger_balance(&self, owner: &str) -> Result<Amount> {
        let wallet = self.journal.wallets().get(owner)?;
        self.escrow
            .ledger()
            .balance(&wallet.address)
            .await
            .map_err(WagerError::from_query)
    }

    /// Send funds out of a custodial account. Returns the new cached balance.
    pub async fn withdraw(&self, owner: &str, recipient: &str, amount: Amount) -> Result<Amount> {
        if amount == Amount::ZERO {
            return Err(WagerError::invalid_input("Amount must be greater than zero"));
        }
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(WagerError::invalid_input("Recipient address must not be empty"));
        }
        let recipient = Address::new(recipient);
        if &recipient == self.settlement.address() {
            return Err(WagerError::invalid_input("Cannot withdraw to the settlement account"));
        }

        let guard = self.journal.wallets().lock(owner).await?;
        let balance = match self
            .escrow
            .spend(&guard, &recipient, amount, ReviewKind::WithdrawUnconfirmed, None)
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                if e.is_under_review() {
                    self.journal.persist_quietly().await;
                }
                return Err(e);
            }
        };

        self.journal
            .commit(vec![WagerEvent::BalanceUpdated {
                owner: owner.to_string(),
                balance,
            }])
            .await?;
        tracing::info!(
            "'{}' withdrew {} sats to {}",
            owner,
            amount.to_sat(),
            recipient
        );
        Ok(balance)
    }

    pub async fn create_wager(&self, creator: &str, choice: Choice, stake: Amount) -> Result<WagerId> {
        self.escrow.create_wager(creator, choice, stake).await
    }

    pub async fn join_wager(
        &self,
        wager_id: WagerId,
        joiner: &str,
        choice: Choice,
        stake: Amount,
    ) -> Result<SettlementResult> {
        self.escrow.join_wager(wager_id, joiner, choice, stake).await
    }

    /// Operator retry of a wager stuck in `PayoutFailed`. Legs that already
    /// confirmed are not paid again.
    pub async fn settle(&self, wager_id: WagerId) -> Result<SettlementResult> {
        let lock = self.journal.registry().try_lock(wager_id)?;
        let wager = lock.wager();

        match wager.state {
            WagerState::PayoutFailed => {}
            WagerState::Resolved => return Err(WagerError::WagerAlreadyResolved(wager_id)),
            state => return Err(WagerError::NotSettleable { id: wager_id, state }),
        }

        let joiner_choice = wager.joiner_choice.ok_or_else(|| {
            WagerError::Core(WagerbookError::internal(format!(
                "Wager {} failed payout without a joiner choice",
                wager_id
            )))
        })?;
        let outcome = resolve(wager.creator_choice, joiner_choice);

        tracing::info!("Retrying payout for wager {}", wager_id);
        self.escrow.settler().settle(&lock, outcome, Vec::new()).await
    }

    pub fn wager(&self, wager_id: WagerId) -> Result<Wager> {
        self.journal.registry().get(wager_id)
    }

    pub fn list_wagers(&self) -> WagerListing {
        let (finished, active): (Vec<Wager>, Vec<Wager>) = self
            .journal
            .registry()
            .all()
            .into_iter()
            .partition(|w| w.is_resolved());
        WagerListing { active, finished }
    }

    pub fn wallets(&self) -> Vec<Wallet> {
        self.journal.wallets().all()
    }

    pub fn review_items(&self) -> Vec<ReviewItem> {
        self.journal.review().list()
    }

    pub async fn dismiss_review(&self, id: Uuid) -> Result<ReviewItem> {
        let item = self
            .journal
            .review()
            .dismiss(id)
            .ok_or_else(|| WagerError::invalid_input(format!("No review item {}", id)))?;
        if let Err(e) = self.journal.persist().await {
            self.journal.review().file(item);
            return Err(e);
        }
        tracing::info!("Dismissed review item {} ({})", id, item.kind);
        Ok(item)
    }

    pub async fn reap(&self, now: DateTime<Utc>) -> Result<Vec<WagerId>> {
        self.reaper.run_once(now).await
    }

    pub fn spawn_reaper(&self) -> ReaperHandle {
        self.reaper.clone().spawn()
    }
}
