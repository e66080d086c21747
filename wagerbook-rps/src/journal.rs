//! Write-before-acknowledge bookkeeping.
//!
//! Every acknowledged state change goes through [`Journal::commit`]: the
//! complete engine state is saved first and events are published only once
//! the save succeeded.

use crate::error::{Result, WagerError};
use crate::events::{Notifier, WagerEvent};
use crate::registry::WagerRegistry;
use crate::review::{ReviewItem, ReviewKind, ReviewQueue};
use crate::wager::{Wager, WagerState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use wagerbook_core::{SnapshotStore, Wallet, WalletStore};

/// Everything that has to survive a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub wallets: Vec<Wallet>,
    pub wagers: Vec<Wager>,
    #[serde(default)]
    pub review: Vec<ReviewItem>,
}

pub struct Journal {
    wallets: Arc<WalletStore>,
    registry: Arc<WagerRegistry>,
    review: Arc<ReviewQueue>,
    store: Arc<dyn SnapshotStore<EngineState>>,
    notifier: Arc<dyn Notifier>,
    persist_lock: Mutex<()>,
}

impl Journal {
    pub fn new(store: Arc<dyn SnapshotStore<EngineState>>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            wallets: Arc::new(WalletStore::new()),
            registry: Arc::new(WagerRegistry::new()),
            review: Arc::new(ReviewQueue::new()),
            store,
            notifier,
            persist_lock: Mutex::new(()),
        }
    }

    pub fn wallets(&self) -> &WalletStore {
        &self.wallets
    }

    pub fn registry(&self) -> &WagerRegistry {
        &self.registry
    }

    pub fn review(&self) -> &ReviewQueue {
        &self.review
    }

    pub fn capture(&self) -> EngineState {
        EngineState {
            wallets: self.wallets.all(),
            wagers: self.registry.all(),
            review: self.review.list(),
        }
    }

    /// Save the current state. Captured under the persist lock so an older
    /// capture never lands after a newer one.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let state = self.capture();
        self.store
            .save(&state)
            .await
            .map_err(WagerError::persistence)
    }

    /// Persist on a path that is already failing; the original error wins.
    pub async fn persist_quietly(&self) {
        if let Err(e) = self.persist().await {
            tracing::error!("Failed to persist state after a failed operation: {}", e);
        }
    }

    pub async fn commit(&self, events: Vec<WagerEvent>) -> Result<()> {
        self.persist().await?;
        for event in events {
            self.notifier.notify(event);
        }
        Ok(())
    }

    /// Load the last snapshot, if any. A wager caught mid-join is put back
    /// up for joining (or marked for payout retry if its stakes were
    /// already escrowed) and flagged for review.
    pub async fn restore(&self) -> Result<bool> {
        let Some(snapshot) = self.store.load().await.map_err(WagerError::persistence)? else {
            tracing::info!("No saved state found, starting empty");
            return Ok(false);
        };

        let mut state = snapshot.state;
        let mut repaired = Vec::new();

        for wager in state.wagers.iter_mut() {
            if wager.state != WagerState::JoinInProgress {
                continue;
            }

            let joiner = wager.joiner.clone().unwrap_or_default();
            let item = if wager.payouts.is_empty() {
                wager.clear_joiner();
                ReviewItem::new(
                    ReviewKind::InterruptedJoin,
                    wager.stake,
                    "Restart during join; the joiner's stake may have reached the settlement account",
                )
            } else {
                wager.state = WagerState::PayoutFailed;
                ReviewItem::new(
                    ReviewKind::PayoutFailed,
                    wager.pot(),
                    "Restart during payout; retry settlement",
                )
            };
            repaired.push(item.for_wager(wager.id).for_owner(joiner));
        }

        tracing::info!(
            "Restored {} wallets, {} wagers, {} review items from snapshot saved at {}",
            state.wallets.len(),
            state.wagers.len(),
            state.review.len(),
            snapshot.saved_at
        );

        self.wallets.restore(state.wallets);
        self.registry.restore(state.wagers);
        self.review.restore(state.review);

        if !repaired.is_empty() {
            for item in repaired {
                self.review.file(item);
            }
            self.persist().await?;
        }

        Ok(true)
    }
}
