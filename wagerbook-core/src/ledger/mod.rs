pub mod http;
pub mod memory;

pub use http::HttpLedger;
pub use memory::MemoryLedger;

use crate::config::LedgerConfig;
use crate::error::{Result, WagerbookError};
use crate::types::{Address, SignedTransfer, TransferHandle, TransferReceipt, TransferStatus};
use async_trait::async_trait;
use bitcoin::Amount;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The external, authoritative ledger.
///
/// Implementations must deduplicate submissions on the request's
/// idempotency key: submitting the same key twice returns the original
/// handle and moves funds at most once.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_balance(&self, address: &Address) -> Result<Amount>;

    async fn submit_transfer(&self, transfer: &SignedTransfer) -> Result<TransferHandle>;

    async fn confirm_transfer(&self, handle: &TransferHandle) -> Result<TransferStatus>;
}

/// Timeout-enforcing front for a [`LedgerClient`].
#[derive(Clone)]
pub struct Ledger {
    client: Arc<dyn LedgerClient>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(client: Arc<dyn LedgerClient>, config: LedgerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub async fn balance(&self, address: &Address) -> Result<Amount> {
        match tokio::time::timeout(self.config.query_timeout, self.client.get_balance(address))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(WagerbookError::Timeout(format!(
                "Balance query for {} exceeded {:?}",
                address, self.config.query_timeout
            ))),
        }
    }

    /// Submit a transfer and wait for finality.
    ///
    /// Errors keep the submission boundary visible: `TransferRejected`
    /// means nothing reached the ledger, `TransferFailed` and
    /// `ConfirmationTimeout` carry the handle of what did.
    pub async fn transfer(&self, transfer: &SignedTransfer) -> Result<TransferReceipt> {
        let handle = self.submit(transfer).await?;
        tracing::debug!(
            "Submitted transfer {} ({} -> {}, {} sats)",
            handle,
            transfer.request.from,
            transfer.request.to,
            transfer.request.amount.to_sat()
        );

        self.await_confirmation(&handle).await?;

        Ok(TransferReceipt {
            handle,
            amount: transfer.request.amount,
            confirmed_at: Utc::now(),
        })
    }

    async fn submit(&self, transfer: &SignedTransfer) -> Result<TransferHandle> {
        match tokio::time::timeout(
            self.config.submit_timeout,
            self.client.submit_transfer(transfer),
        )
        .await
        {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e @ WagerbookError::TransferRejected { .. })) => Err(e),
            // Anything else leaves open whether the ledger accepted it; the
            // idempotency key is the only safe way to find out.
            Ok(Err(e)) => {
                tracing::warn!(
                    "Submission of {} ended ambiguously: {}",
                    transfer.request.idempotency_key,
                    e
                );
                Err(WagerbookError::ConfirmationTimeout {
                    handle: format!("unacknowledged:{}", transfer.request.idempotency_key),
                    waited_ms: 0,
                })
            }
            Err(_) => Err(WagerbookError::ConfirmationTimeout {
                handle: format!("unacknowledged:{}", transfer.request.idempotency_key),
                waited_ms: self.config.submit_timeout.as_millis() as u64,
            }),
        }
    }

    async fn await_confirmation(&self, handle: &TransferHandle) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.config.confirm_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.confirmation_timeout(handle, started));
            }

            let status =
                match tokio::time::timeout(remaining, self.client.confirm_transfer(handle)).await {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => {
                        // A failed status query says nothing about the transfer.
                        tracing::warn!("Confirmation query for {} failed: {}", handle, e);
                        TransferStatus::Pending
                    }
                    Err(_) => return Err(self.confirmation_timeout(handle, started)),
                };

            match status {
                TransferStatus::Confirmed => return Ok(()),
                TransferStatus::Failed { reason } => {
                    return Err(WagerbookError::TransferFailed {
                        handle: handle.id.clone(),
                        reason,
                    })
                }
                TransferStatus::Pending => {
                    let pause = self
                        .config
                        .confirm_poll_interval
                        .min(deadline.saturating_duration_since(Instant::now()));
                    if pause.is_zero() {
                        return Err(self.confirmation_timeout(handle, started));
                    }
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    fn confirmation_timeout(&self, handle: &TransferHandle, started: Instant) -> WagerbookError {
        let waited: Duration = started.elapsed();
        WagerbookError::ConfirmationTimeout {
            handle: handle.id.clone(),
            waited_ms: waited.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::{KeypairSigner, TransferSigner};
    use crate::types::TransferRequest;
    use bitcoin::Network;

    fn fast_config() -> LedgerConfig {
        LedgerConfig {
            gateway_url: "memory".to_string(),
            query_timeout: Duration::from_millis(200),
            submit_timeout: Duration::from_millis(200),
            confirm_timeout: Duration::from_millis(300),
            confirm_poll_interval: Duration::from_millis(10),
        }
    }

    fn funded(memory: &MemoryLedger, network: Network) -> KeypairSigner {
        let signer = KeypairSigner::generate(network).unwrap();
        memory.deposit(signer.address(), Amount::from_sat(10_000));
        signer
    }

    #[tokio::test]
    async fn test_transfer_waits_for_confirmation() {
        let memory = Arc::new(MemoryLedger::new());
        memory.set_confirmation_delay(Duration::from_millis(40));
        let ledger = Ledger::new(memory.clone(), fast_config());

        let from = funded(&memory, Network::Regtest);
        let to = Address::new("pot");
        let request = TransferRequest::new(from.address().clone(), to.clone(), Amount::from_sat(2_500));
        let signed = from.sign(request).unwrap();

        let receipt = ledger.transfer(&signed).await.unwrap();
        assert_eq!(receipt.amount, Amount::from_sat(2_500));
        assert_eq!(ledger.balance(&to).await.unwrap(), Amount::from_sat(2_500));
        assert_eq!(
            ledger.balance(from.address()).await.unwrap(),
            Amount::from_sat(7_500)
        );
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_submitted() {
        let memory = Arc::new(MemoryLedger::new());
        memory.fail_next_submit("node unavailable");
        let ledger = Ledger::new(memory.clone(), fast_config());

        let from = funded(&memory, Network::Regtest);
        let request = TransferRequest::new(from.address().clone(), Address::new("pot"), Amount::from_sat(1));
        let err = ledger.transfer(&from.sign(request).unwrap()).await.unwrap_err();

        assert!(matches!(err, WagerbookError::TransferRejected { .. }));
        assert!(!err.transfer_was_submitted());
        assert_eq!(
            ledger.balance(from.address()).await.unwrap(),
            Amount::from_sat(10_000)
        );
    }

    #[tokio::test]
    async fn test_stalled_confirmation_times_out_with_handle() {
        let memory = Arc::new(MemoryLedger::new());
        memory.stall_confirmations(true);
        let ledger = Ledger::new(memory.clone(), fast_config());

        let from = funded(&memory, Network::Regtest);
        let request = TransferRequest::new(from.address().clone(), Address::new("pot"), Amount::from_sat(5));
        let err = ledger.transfer(&from.sign(request).unwrap()).await.unwrap_err();

        assert!(err.is_ambiguous_transfer());
        assert!(err.transfer_handle().is_some());
    }

    #[tokio::test]
    async fn test_failed_confirmation_reports_handle() {
        let memory = Arc::new(MemoryLedger::new());
        memory.fail_next_confirm("dropped from mempool");
        let ledger = Ledger::new(memory.clone(), fast_config());

        let from = funded(&memory, Network::Regtest);
        let request = TransferRequest::new(from.address().clone(), Address::new("pot"), Amount::from_sat(5));
        let err = ledger.transfer(&from.sign(request).unwrap()).await.unwrap_err();

        assert!(matches!(err, WagerbookError::TransferFailed { .. }));
        assert!(err.transfer_was_submitted());
        assert!(!err.is_ambiguous_transfer());
    }
}
