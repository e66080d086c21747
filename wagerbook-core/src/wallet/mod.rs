//! Custodial wallet records and their cached balances.
//!
//! Each wallet sits in a [`WalletSlot`]: an async operation lock that
//! serializes balance-dependent work for that wallet (reconcile, transfer,
//! debit), and a short synchronous lock around the record itself so
//! snapshots never wait on ledger I/O.
//!
//! Wallet locks are leaves: code holding one must not acquire any other
//! wallet or wager lock.

use crate::error::{Result, WagerbookError};
use crate::types::Address;
use bitcoin::Amount;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: String,
    pub address: Address,
    /// Lower bound on the ledger balance; refreshed by reconciliation.
    pub last_balance: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner: impl Into<String>, address: Address) -> Self {
        let now = Utc::now();
        Self {
            owner: owner.into(),
            address,
            last_balance: Amount::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct WalletSlot {
    op_lock: Arc<Mutex<()>>,
    data: RwLock<Wallet>,
}

impl WalletSlot {
    fn new(wallet: Wallet) -> Self {
        Self {
            op_lock: Arc::new(Mutex::new(())),
            data: RwLock::new(wallet),
        }
    }

    pub fn snapshot(&self) -> Wallet {
        self.data.read().clone()
    }
}

/// Exclusive right to change one wallet's cached balance.
pub struct WalletGuard {
    slot: Arc<WalletSlot>,
    _permit: OwnedMutexGuard<()>,
}

impl WalletGuard {
    pub fn wallet(&self) -> Wallet {
        self.slot.snapshot()
    }

    pub fn owner(&self) -> String {
        self.slot.data.read().owner.clone()
    }

    pub fn address(&self) -> Address {
        self.slot.data.read().address.clone()
    }

    pub fn balance(&self) -> Amount {
        self.slot.data.read().last_balance
    }

    /// Subtract a confirmed outgoing transfer. Never goes below zero.
    pub fn debit(&self, amount: Amount) -> Result<Amount> {
        let mut wallet = self.slot.data.write();
        let remaining = wallet.last_balance.checked_sub(amount).ok_or(
            WagerbookError::InsufficientFunds {
                need: amount.to_sat(),
                available: wallet.last_balance.to_sat(),
            },
        )?;
        wallet.last_balance = remaining;
        wallet.updated_at = Utc::now();
        Ok(remaining)
    }

    /// Add a confirmed incoming transfer that this service initiated.
    pub fn credit(&self, amount: Amount) -> Result<Amount> {
        let mut wallet = self.slot.data.write();
        let total = wallet
            .last_balance
            .checked_add(amount)
            .ok_or_else(|| WagerbookError::internal("Balance overflow"))?;
        wallet.last_balance = total;
        wallet.updated_at = Utc::now();
        Ok(total)
    }

    pub(crate) fn raise_to(&self, observed: Amount) {
        let mut wallet = self.slot.data.write();
        if observed > wallet.last_balance {
            wallet.last_balance = observed;
            wallet.updated_at = Utc::now();
        }
    }
}

#[derive(Default)]
pub struct WalletStore {
    wallets: RwLock<HashMap<String, Arc<WalletSlot>>>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, wallet: Wallet) -> Result<()> {
        let mut wallets = self.wallets.write();
        if wallets.contains_key(&wallet.owner) {
            return Err(WagerbookError::WalletExists {
                owner: wallet.owner,
            });
        }
        wallets.insert(wallet.owner.clone(), Arc::new(WalletSlot::new(wallet)));
        Ok(())
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.wallets.read().contains_key(owner)
    }

    pub fn get(&self, owner: &str) -> Result<Wallet> {
        Ok(self.slot(owner)?.snapshot())
    }

    fn slot(&self, owner: &str) -> Result<Arc<WalletSlot>> {
        self.wallets
            .read()
            .get(owner)
            .cloned()
            .ok_or_else(|| WagerbookError::WalletNotFound {
                owner: owner.to_string(),
            })
    }

    /// Wait for exclusive use of `owner`'s wallet.
    pub async fn lock(&self, owner: &str) -> Result<WalletGuard> {
        let slot = self.slot(owner)?;
        let permit = slot.op_lock.clone().lock_owned().await;
        Ok(WalletGuard {
            slot,
            _permit: permit,
        })
    }

    pub fn all(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self
            .wallets
            .read()
            .values()
            .map(|slot| slot.snapshot())
            .collect();
        wallets.sort_by(|a, b| a.owner.cmp(&b.owner));
        wallets
    }

    /// Replace the whole store with persisted records.
    pub fn restore(&self, records: Vec<Wallet>) {
        let mut wallets = self.wallets.write();
        wallets.clear();
        for wallet in records {
            wallets.insert(wallet.owner.clone(), Arc::new(WalletSlot::new(wallet)));
        }
    }

    pub fn len(&self) -> usize {
        self.wallets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
