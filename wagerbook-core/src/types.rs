use bitcoin::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Ledger address of a custodial account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unsigned intent to move `amount` from one address to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub idempotency_key: Uuid,
}

impl TransferRequest {
    pub fn new(from: Address, to: Address, amount: Amount) -> Self {
        Self::with_key(from, to, amount, Uuid::new_v4())
    }

    pub fn with_key(from: Address, to: Address, amount: Amount, idempotency_key: Uuid) -> Self {
        Self {
            from,
            to,
            amount,
            idempotency_key,
        }
    }

    /// SHA-256 over the canonical encoding; this is what gets signed.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.from.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.to.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.amount.to_sat().to_be_bytes());
        hasher.update(self.idempotency_key.as_bytes());
        hasher.finalize().into()
    }
}

/// A transfer request together with the custodian's signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransfer {
    pub request: TransferRequest,
    pub public_key: String, // compressed secp256k1, hex
    pub signature: String,  // schnorr, hex
}

/// Ledger-side reference to a submitted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferHandle {
    pub id: String,
    pub idempotency_key: Uuid,
}

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
}

/// Proof that a transfer reached finality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub handle: TransferHandle,
    pub amount: Amount,
    pub confirmed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_binds_every_field() {
        let key = Uuid::new_v4();
        let base = TransferRequest::with_key(
            Address::new("alice"),
            Address::new("pot"),
            Amount::from_sat(1_000),
            key,
        );

        let mut other_amount = base.clone();
        other_amount.amount = Amount::from_sat(1_001);
        let mut other_to = base.clone();
        other_to.to = Address::new("mallory");
        let mut other_key = base.clone();
        other_key.idempotency_key = Uuid::new_v4();

        assert_eq!(base.digest(), base.clone().digest());
        assert_ne!(base.digest(), other_amount.digest());
        assert_ne!(base.digest(), other_to.digest());
        assert_ne!(base.digest(), other_key.digest());
    }
}
