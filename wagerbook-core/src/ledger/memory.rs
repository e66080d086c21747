use crate::custody::verify_transfer;
use crate::error::{Result, WagerbookError};
use crate::ledger::LedgerClient;
use crate::types::{Address, SignedTransfer, TransferHandle, TransferRequest, TransferStatus};
use async_trait::async_trait;
use bitcoin::{Amount, Network};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// In-process ledger.
///
/// Funds leave the source at submission and land at the destination once
/// the transfer is confirmed; a failed transfer returns them to the source.
/// Fault hooks let callers simulate rejected submissions, failed or stalled
/// confirmations and slow finality.
pub struct MemoryLedger {
    network: Network,
    state: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, Amount>,
    transfers: HashMap<String, Entry>,
    by_key: HashMap<Uuid, String>,
    next_id: u64,
    confirmation_delay: Duration,
    stall: bool,
    reject_next: Option<String>,
    doom_next: Option<String>,
    doomed_sources: HashMap<Address, String>,
    stalled_sources: HashSet<Address>,
}

struct Entry {
    request: TransferRequest,
    submitted_at: Instant,
    status: TransferStatus,
    doomed: Option<String>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_network(Network::Regtest)
    }

    pub fn with_network(network: Network) -> Self {
        Self {
            network,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Credit `address` out of thin air, as an external deposit would.
    pub fn deposit(&self, address: &Address, amount: Amount) {
        let mut state = self.state.lock();
        let balance = state.balances.entry(address.clone()).or_insert(Amount::ZERO);
        *balance += amount;
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.state
            .lock()
            .balances
            .get(address)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn set_confirmation_delay(&self, delay: Duration) {
        self.state.lock().confirmation_delay = delay;
    }

    /// Keep every transfer pending until turned off again.
    pub fn stall_confirmations(&self, stall: bool) {
        self.state.lock().stall = stall;
    }

    pub fn fail_next_submit(&self, reason: impl Into<String>) {
        self.state.lock().reject_next = Some(reason.into());
    }

    /// The next accepted transfer will report failure when confirmed.
    pub fn fail_next_confirm(&self, reason: impl Into<String>) {
        self.state.lock().doom_next = Some(reason.into());
    }

    /// Every transfer out of `source` fails at confirmation until cleared.
    pub fn fail_transfers_from(&self, source: &Address, reason: impl Into<String>) {
        self.state
            .lock()
            .doomed_sources
            .insert(source.clone(), reason.into());
    }

    pub fn stall_transfers_from(&self, source: &Address) {
        self.state.lock().stalled_sources.insert(source.clone());
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.stall = false;
        state.reject_next = None;
        state.doom_next = None;
        state.doomed_sources.clear();
        state.stalled_sources.clear();
    }

    /// Transfers into `destination` that reached finality.
    pub fn confirmed_into(&self, destination: &Address) -> Vec<Amount> {
        self.state
            .lock()
            .transfers
            .values()
            .filter(|e| e.status == TransferStatus::Confirmed && &e.request.to == destination)
            .map(|e| e.request.amount)
            .collect()
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().transfers.len()
    }

    fn settle_entry(state: &mut LedgerState, id: &str) -> TransferStatus {
        let now = Instant::now();
        let delay = state.confirmation_delay;
        let stall_all = state.stall;

        let Some(entry) = state.transfers.get_mut(id) else {
            return TransferStatus::Failed {
                reason: format!("unknown transfer {}", id),
            };
        };

        if entry.status != TransferStatus::Pending {
            return entry.status.clone();
        }

        if stall_all
            || state.stalled_sources.contains(&entry.request.from)
            || now.duration_since(entry.submitted_at) < delay
        {
            return TransferStatus::Pending;
        }

        let (target, amount) = match entry.doomed.take() {
            Some(reason) => {
                entry.status = TransferStatus::Failed { reason };
                (entry.request.from.clone(), entry.request.amount)
            }
            None => {
                entry.status = TransferStatus::Confirmed;
                (entry.request.to.clone(), entry.request.amount)
            }
        };
        let status = entry.status.clone();

        let balance = state.balances.entry(target).or_insert(Amount::ZERO);
        *balance += amount;
        status
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_balance(&self, address: &Address) -> Result<Amount> {
        Ok(self.balance_of(address))
    }

    async fn submit_transfer(&self, transfer: &SignedTransfer) -> Result<TransferHandle> {
        verify_transfer(transfer, self.network).map_err(|e| WagerbookError::TransferRejected {
            reason: e.to_string(),
        })?;

        let mut state = self.state.lock();
        let request = &transfer.request;

        if let Some(id) = state.by_key.get(&request.idempotency_key) {
            return Ok(TransferHandle {
                id: id.clone(),
                idempotency_key: request.idempotency_key,
            });
        }

        if let Some(reason) = state.reject_next.take() {
            return Err(WagerbookError::TransferRejected { reason });
        }

        let available = state
            .balances
            .get(&request.from)
            .copied()
            .unwrap_or(Amount::ZERO);
        let remaining = available
            .checked_sub(request.amount)
            .ok_or_else(|| WagerbookError::TransferRejected {
                reason: format!(
                    "insufficient funds: need {}, have {}",
                    request.amount.to_sat(),
                    available.to_sat()
                ),
            })?;
        state.balances.insert(request.from.clone(), remaining);

        state.next_id += 1;
        let id = format!("mem-{:08}", state.next_id);
        let doomed = state
            .doom_next
            .take()
            .or_else(|| state.doomed_sources.get(&request.from).cloned());

        state.transfers.insert(
            id.clone(),
            Entry {
                request: request.clone(),
                submitted_at: Instant::now(),
                status: TransferStatus::Pending,
                doomed,
            },
        );
        state.by_key.insert(request.idempotency_key, id.clone());

        Ok(TransferHandle {
            id,
            idempotency_key: request.idempotency_key,
        })
    }

    async fn confirm_transfer(&self, handle: &TransferHandle) -> Result<TransferStatus> {
        let mut state = self.state.lock();
        Ok(Self::settle_entry(&mut state, &handle.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::{KeypairSigner, TransferSigner};

    #[tokio::test]
    async fn test_idempotent_submission_moves_funds_once() {
        let ledger = MemoryLedger::new();
        let signer = KeypairSigner::generate(Network::Regtest).unwrap();
        ledger.deposit(signer.address(), Amount::from_sat(1_000));

        let pot = Address::new("pot");
        let request = TransferRequest::new(signer.address().clone(), pot.clone(), Amount::from_sat(600));
        let signed = signer.sign(request).unwrap();

        let first = ledger.submit_transfer(&signed).await.unwrap();
        let second = ledger.submit_transfer(&signed).await.unwrap();
        assert_eq!(first, second);

        assert_eq!(
            ledger.confirm_transfer(&first).await.unwrap(),
            TransferStatus::Confirmed
        );
        assert_eq!(ledger.balance_of(&pot), Amount::from_sat(600));
        assert_eq!(ledger.balance_of(signer.address()), Amount::from_sat(400));
        assert_eq!(ledger.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_transfer_refunds_source() {
        let ledger = MemoryLedger::new();
        let signer = KeypairSigner::generate(Network::Regtest).unwrap();
        ledger.deposit(signer.address(), Amount::from_sat(1_000));
        ledger.fail_transfers_from(signer.address(), "broken");

        let request = TransferRequest::new(signer.address().clone(), Address::new("pot"), Amount::from_sat(600));
        let handle = ledger
            .submit_transfer(&signer.sign(request).unwrap())
            .await
            .unwrap();

        assert!(matches!(
            ledger.confirm_transfer(&handle).await.unwrap(),
            TransferStatus::Failed { .. }
        ));
        assert_eq!(ledger.balance_of(signer.address()), Amount::from_sat(1_000));
    }

    #[tokio::test]
    async fn test_rejects_unsigned_spend() {
        let ledger = MemoryLedger::new();
        let owner = KeypairSigner::generate(Network::Regtest).unwrap();
        let thief = KeypairSigner::generate(Network::Regtest).unwrap();
        ledger.deposit(owner.address(), Amount::from_sat(1_000));

        let request = TransferRequest::new(thief.address().clone(), Address::new("pot"), Amount::from_sat(1));
        let mut signed = thief.sign(request).unwrap();
        signed.request.from = owner.address().clone();

        assert!(ledger.submit_transfer(&signed).await.is_err());
        assert_eq!(ledger.balance_of(owner.address()), Amount::from_sat(1_000));
    }

    #[tokio::test]
    async fn test_overdraft_rejected() {
        let ledger = MemoryLedger::new();
        let signer = KeypairSigner::generate(Network::Regtest).unwrap();
        ledger.deposit(signer.address(), Amount::from_sat(10));

        let request = TransferRequest::new(signer.address().clone(), Address::new("pot"), Amount::from_sat(11));
        let err = ledger
            .submit_transfer(&signer.sign(request).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WagerbookError::TransferRejected { .. }));
    }
}
