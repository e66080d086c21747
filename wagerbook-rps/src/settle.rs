use crate::error::{Result, WagerError};
use crate::events::WagerEvent;
use crate::journal::Journal;
use crate::outcome::Outcome;
use crate::registry::WagerLock;
use crate::review::{ReviewItem, ReviewKind};
use crate::wager::{PayoutLeg, Wager, WagerResult, WagerState};
use bitcoin::Amount;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wagerbook_core::{Ledger, TransferRequest, TransferSigner, WagerbookError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub wager: Wager,
    pub outcome: Outcome,
}

impl SettlementResult {
    pub fn winner(&self) -> Option<&str> {
        self.wager.result.as_ref().and_then(|r| r.winner.as_deref())
    }
}

/// Pays the pot out of the settlement account.
pub struct PayoutSettler {
    journal: Arc<Journal>,
    ledger: Ledger,
    settlement: Arc<dyn TransferSigner>,
}

impl PayoutSettler {
    pub fn new(journal: Arc<Journal>, ledger: Ledger, settlement: Arc<dyn TransferSigner>) -> Self {
        Self {
            journal,
            ledger,
            settlement,
        }
    }

    /// Tie: each participant gets their stake back. Otherwise the winner
    /// takes the whole pot.
    pub fn plan(wager: &Wager, outcome: Outcome) -> Result<Vec<PayoutLeg>> {
        let joiner = wager
            .joiner
            .as_deref()
            .ok_or_else(|| WagerError::invalid_input("Wager has no joiner to settle with"))?;

        let legs = match outcome {
            Outcome::Tie => vec![
                PayoutLeg::new(&wager.creator, wager.stake),
                PayoutLeg::new(joiner, wager.stake),
            ],
            Outcome::FirstWins => vec![PayoutLeg::new(&wager.creator, wager.pot())],
            Outcome::SecondWins => vec![PayoutLeg::new(joiner, wager.pot())],
        };
        Ok(legs)
    }

    /// Settle a joined wager the caller holds the lock for.
    ///
    /// Only legs not yet confirmed are submitted, each with its recorded
    /// idempotency key. `events` are published after the final state is
    /// persisted, ahead of `WagerResolved`.
    pub async fn settle(
        &self,
        lock: &WagerLock,
        outcome: Outcome,
        mut events: Vec<WagerEvent>,
    ) -> Result<SettlementResult> {
        let wager = lock.wager();
        if wager.is_resolved() {
            return Err(WagerError::WagerAlreadyResolved(wager.id));
        }

        if wager.payouts.is_empty() {
            let legs = Self::plan(&wager, outcome)?;
            lock.update(|w| w.payouts = legs);

            // Stakes are escrowed from here on; the legs must be on disk
            // before any of them is paid.
            if let Err(e) = self.journal.persist().await {
                lock.update(|w| w.state = WagerState::PayoutFailed);
                self.journal.review().file(
                    ReviewItem::new(ReviewKind::PayoutFailed, wager.pot(), e.to_string())
                        .for_wager(wager.id),
                );
                self.journal.persist_quietly().await;
                return Err(e);
            }
        }

        let legs = lock.wager().payouts;
        let mut failures = Vec::new();

        for (index, leg) in legs.iter().enumerate() {
            if leg.is_confirmed() {
                continue;
            }

            match self.pay(leg).await {
                Ok((handle, balance)) => {
                    tracing::info!(
                        "Paid {} sats to '{}' for wager {} ({})",
                        leg.amount.to_sat(),
                        leg.recipient,
                        wager.id,
                        handle
                    );
                    lock.update(|w| w.payouts[index].confirm(handle));
                    events.push(WagerEvent::BalanceUpdated {
                        owner: leg.recipient.clone(),
                        balance,
                    });
                }
                Err(err) => {
                    tracing::error!(
                        "Payout of {} sats to '{}' for wager {} failed: {}",
                        leg.amount.to_sat(),
                        leg.recipient,
                        wager.id,
                        err
                    );
                    lock.update(|w| w.payouts[index].fail(&err));
                    failures.push((leg.clone(), err));
                }
            }
        }

        self.journal.review().clear_for(wager.id, ReviewKind::PayoutFailed);

        if !failures.is_empty() {
            lock.update(|w| w.state = WagerState::PayoutFailed);
            let reason = failures
                .iter()
                .map(|(leg, err)| format!("{}: {}", leg.recipient, err))
                .collect::<Vec<_>>()
                .join("; ");
            for (leg, err) in failures {
                self.journal.review().file(
                    ReviewItem::new(ReviewKind::PayoutFailed, leg.amount, err.to_string())
                        .for_wager(wager.id)
                        .for_owner(leg.recipient)
                        .with_handle(err.transfer_handle().map(str::to_string)),
                );
            }

            self.journal.commit(events).await?;
            return Err(WagerError::PayoutFailed {
                id: wager.id,
                reason,
            });
        }

        let winner = wager.winner_for(outcome).map(str::to_string);
        let resolved = lock.update(|w| {
            w.state = WagerState::Resolved;
            w.result = Some(WagerResult { outcome, winner });
            w.resolved_at = Some(Utc::now());
        });
        events.push(WagerEvent::WagerResolved {
            wager: resolved.clone(),
        });
        self.journal.commit(events).await?;

        tracing::info!("Wager {} resolved: {}", resolved.id, outcome);
        Ok(SettlementResult {
            wager: resolved,
            outcome,
        })
    }

    /// One leg, with the recipient's wallet held from submission to credit
    /// so a reconcile cannot count the payout as a deposit.
    async fn pay(&self, leg: &PayoutLeg) -> std::result::Result<(String, Amount), WagerbookError> {
        let guard = self.journal.wallets().lock(&leg.recipient).await?;
        let request = TransferRequest::with_key(
            self.settlement.address().clone(),
            guard.address(),
            leg.amount,
            leg.idempotency_key,
        );
        let signed = self.settlement.sign(request)?;
        let receipt = self.ledger.transfer(&signed).await?;
        let balance = guard.credit(leg.amount)?;
        Ok((receipt.handle.id, balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Choice;

    fn joined() -> Wager {
        let mut wager = Wager::new("alice", Choice::Rock, Amount::from_sat(1_000));
        wager.joiner = Some("bob".into());
        wager.joiner_choice = Some(Choice::Rock);
        wager.state = WagerState::JoinInProgress;
        wager
    }

    #[test]
    fn test_tie_splits_pot_evenly() {
        let legs = PayoutSettler::plan(&joined(), Outcome::Tie).unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs.iter().all(|l| l.amount == Amount::from_sat(1_000)));
        assert_ne!(legs[0].idempotency_key, legs[1].idempotency_key);
    }

    #[test]
    fn test_winner_takes_pot() {
        let legs = PayoutSettler::plan(&joined(), Outcome::SecondWins).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].recipient, "bob");
        assert_eq!(legs[0].amount, Amount::from_sat(2_000));
    }

    #[test]
    fn test_unjoined_wager_cannot_be_planned() {
        let wager = Wager::new("alice", Choice::Rock, Amount::from_sat(1_000));
        assert!(PayoutSettler::plan(&wager, Outcome::Tie).is_err());
    }
}
