use crate::error::Result;
use crate::ledger::Ledger;
use crate::wallet::WalletGuard;
use bitcoin::Amount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Deposit the cache did not know about; zero if none.
    pub incoming: Amount,
    /// What the ledger reported.
    pub observed: Amount,
    /// Cached balance after reconciliation.
    pub balance: Amount,
}

impl Reconciliation {
    pub fn has_deposit(&self) -> bool {
        self.incoming > Amount::ZERO
    }
}

/// Refreshes cached balances from the ledger.
///
/// Only ever raises a cached balance. A ledger figure below the cache is a
/// lagging read (or races a debit we already recorded) and is ignored.
#[derive(Clone)]
pub struct BalanceReconciler {
    ledger: Ledger,
}

impl BalanceReconciler {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub async fn reconcile(&self, wallet: &WalletGuard) -> Result<Reconciliation> {
        let address = wallet.address();
        let cached = wallet.balance();
        let observed = self.ledger.balance(&address).await?;

        if observed > cached {
            wallet.raise_to(observed);
            let incoming = observed - cached;
            tracing::info!(
                "Detected deposit of {} sats for '{}'",
                incoming.to_sat(),
                wallet.owner()
            );
            return Ok(Reconciliation {
                incoming,
                observed,
                balance: observed,
            });
        }

        if observed < cached {
            tracing::warn!(
                "Ledger reports {} sats for '{}' below cached {} sats; treating as transient",
                observed.to_sat(),
                wallet.owner(),
                cached.to_sat()
            );
        }

        Ok(Reconciliation {
            incoming: Amount::ZERO,
            observed,
            balance: cached,
        })
    }
}
