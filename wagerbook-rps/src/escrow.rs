//! Create/join protocol: stake escrow into the settlement account and the
//! wager transitions around it.
//!
//! Lock order is wager lock, then wallet lock. A wallet lock is never held
//! while waiting for another wallet or wager lock.

use crate::error::{Result, WagerError};
use crate::events::WagerEvent;
use crate::journal::Journal;
use crate::outcome::{resolve, Choice};
use crate::review::{ReviewItem, ReviewKind};
use crate::settle::{PayoutSettler, SettlementResult};
use crate::wager::{Wager, WagerId, WagerState};
use bitcoin::Amount;
use chrono::Utc;
use std::sync::Arc;
use wagerbook_core::{
    Address, BalanceReconciler, KeyVault, Ledger, Reconciliation, TransferRequest,
    TransferSigner, WalletGuard,
};

pub struct EscrowOrchestrator {
    journal: Arc<Journal>,
    vault: Arc<KeyVault>,
    ledger: Ledger,
    reconciler: BalanceReconciler,
    settlement: Arc<dyn TransferSigner>,
    settler: PayoutSettler,
}

impl EscrowOrchestrator {
    pub fn new(
        journal: Arc<Journal>,
        vault: Arc<KeyVault>,
        ledger: Ledger,
        settlement: Arc<dyn TransferSigner>,
    ) -> Self {
        let reconciler = BalanceReconciler::new(ledger.clone());
        let settler = PayoutSettler::new(journal.clone(), ledger.clone(), settlement.clone());
        Self {
            journal,
            vault,
            ledger,
            reconciler,
            settlement,
            settler,
        }
    }

    pub fn settler(&self) -> &PayoutSettler {
        &self.settler
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn create_wager(&self, creator: &str, choice: Choice, stake: Amount) -> Result<WagerId> {
        validate_stake(stake)?;

        let guard = self.journal.wallets().lock(creator).await?;
        let balance = match self
            .spend(
                &guard,
                self.settlement.address(),
                stake,
                ReviewKind::CreateStakeUnconfirmed,
                None,
            )
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

        let wager = Wager::new(creator, choice, stake);
        let id = wager.id;
        let lock = self.journal.registry().insert_locked(wager.clone())?;
        let committed = self
            .journal
            .commit(vec![
                WagerEvent::BalanceUpdated {
                    owner: creator.to_string(),
                    balance,
                },
                WagerEvent::WagerCreated { wager },
            ])
            .await;

        if let Err(e) = committed {
            // Unacknowledged wagers must never be joined; the stake sits in
            // escrow until an operator refunds it.
            self.journal.registry().remove(&lock);
            self.journal.review().file(
                ReviewItem::new(
                    ReviewKind::UnrecordedWager,
                    stake,
                    format!("Wager {} could not be recorded: {}", id, e),
                )
                .for_wager(id)
                .for_owner(creator),
            );
            self.journal.persist_quietly().await;
            return Err(e);
        }
        drop(lock);
        drop(guard);

        tracing::info!(
            "Wager {} created by '{}' for {} sats",
            id,
            creator,
            stake.to_sat()
        );
        Ok(id)
    }

    pub async fn join_wager(
        &self,
        wager_id: WagerId,
        joiner: &str,
        choice: Choice,
        stake: Amount,
    ) -> Result<SettlementResult> {
        let lock = self.journal.registry().try_lock(wager_id)?;
        let wager = lock.wager();

        if wager.joiner.is_some() {
            return Err(WagerError::WagerHasJoiner(wager_id));
        }
        match wager.state {
            WagerState::AwaitingJoiner => {}
            WagerState::Resolved => return Err(WagerError::WagerAlreadyResolved(wager_id)),
            WagerState::JoinInProgress | WagerState::PayoutFailed => {
                return Err(WagerError::WagerHasJoiner(wager_id))
            }
        }
        if wager.creator == joiner {
            return Err(WagerError::invalid_input("Cannot join your own wager"));
        }
        if stake != wager.stake {
            return Err(WagerError::invalid_input(format!(
                "Stake must match the wager's {} sats, got {}",
                wager.stake.to_sat(),
                stake.to_sat()
            )));
        }

        let guard = self.journal.wallets().lock(joiner).await?;

        lock.update(|w| {
            w.joiner = Some(joiner.to_string());
            w.joiner_choice = Some(choice);
            w.state = WagerState::JoinInProgress;
        });
        if let Err(e) = self.journal.persist().await {
            lock.update(|w| w.clear_joiner());
            return Err(e);
        }

        let balance = match self
            .spend(
                &guard,
                self.settlement.address(),
                stake,
                ReviewKind::JoinStakeUnconfirmed,
                Some(wager_id),
            )
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("Join of wager {} by '{}' failed: {}", wager_id, joiner, e);
                lock.update(|w| w.clear_joiner());
                self.journal.persist_quietly().await;
                return Err(e);
            }
        };
        drop(guard);

        let joined = lock.update(|w| w.joined_at = Some(Utc::now()));
        tracing::info!("'{}' joined wager {}", joiner, wager_id);

        let outcome = resolve(joined.creator_choice, choice);
        self.settler
            .settle(
                &lock,
                outcome,
                vec![
                    WagerEvent::BalanceUpdated {
                        owner: joiner.to_string(),
                        balance,
                    },
                    WagerEvent::WagerJoined { wager: joined },
                ],
            )
            .await
    }

    /// Reconcile, then persist and announce any deposit found.
    pub async fn refresh(&self, guard: &WalletGuard) -> Result<Reconciliation> {
        let reconciliation = self
            .reconciler
            .reconcile(guard)
            .await
            .map_err(WagerError::from_query)?;

        if reconciliation.has_deposit() {
            self.journal
                .commit(vec![WagerEvent::BalanceUpdated {
                    owner: guard.owner(),
                    balance: reconciliation.balance,
                }])
                .await?;
        }
        Ok(reconciliation)
    }

    /// Move `amount` out of a locked wallet and record the debit. Returns
    /// the new cached balance. An unconfirmed transfer is filed for review
    /// but not persisted; callers decide when to save.
    pub async fn spend(
        &self,
        guard: &WalletGuard,
        to: &Address,
        amount: Amount,
        kind: ReviewKind,
        wager_id: Option<WagerId>,
    ) -> Result<Amount> {
        let owner = guard.owner();
        self.refresh(guard).await?;

        let available = guard.balance();
        if available < amount {
            return Err(WagerError::InsufficientBalance {
                owner,
                need: amount.to_sat(),
                available: available.to_sat(),
            });
        }

        let signer = self.vault.signer(&owner).await?;
        let request = TransferRequest::new(guard.address(), to.clone(), amount);
        let signed = signer.sign(request)?;

        match self.ledger.transfer(&signed).await {
            Ok(receipt) => {
                tracing::debug!(
                    "Transfer {} of {} sats from '{}' confirmed",
                    receipt.handle,
                    amount.to_sat(),
                    owner
                );
                Ok(guard.debit(amount)?)
            }
            Err(err) => {
                if err.is_ambiguous_transfer() {
                    let mut item = ReviewItem::new(kind, amount, err.to_string())
                        .for_owner(&owner)
                        .with_handle(err.transfer_handle().map(str::to_string));
                    if let Some(id) = wager_id {
                        item = item.for_wager(id);
                    }
                    self.journal.review().file(item);
                }
                Err(WagerError::from_transfer(err))
            }
        }
    }
}

fn validate_stake(stake: Amount) -> Result<()> {
    if stake == Amount::ZERO {
        return Err(WagerError::invalid_input("Stake must be greater than zero"));
    }
    if stake.checked_mul(2).is_none() {
        return Err(WagerError::invalid_input("Stake is too large"));
    }
    Ok(())
}
