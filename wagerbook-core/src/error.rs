use thiserror::Error;

pub type Result<T> = std::result::Result<T, WagerbookError>;

#[derive(Error, Debug)]
pub enum WagerbookError {
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    /// The ledger refused the transfer outright; nothing moved.
    #[error("Transfer rejected by ledger: {reason}")]
    TransferRejected { reason: String },

    /// The ledger accepted the transfer and later reported it as failed.
    #[error("Transfer {handle} failed: {reason}")]
    TransferFailed { handle: String, reason: String },

    /// The transfer was submitted but finality was not observed in time.
    #[error("Transfer {handle} not confirmed within {waited_ms} ms")]
    ConfirmationTimeout { handle: String, waited_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Insufficient funds: need {need}, have {available}")]
    InsufficientFunds { need: u64, available: u64 },

    #[error("Wallet not found: {owner}")]
    WalletNotFound { owner: String },

    #[error("Wallet already exists: {owner}")]
    WalletExists { owner: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Signing error: {0}")]
    Signer(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WagerbookError {
    pub fn wallet(msg: impl Into<String>) -> Self {
        Self::Wallet(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn signer(msg: impl Into<String>) -> Self {
        Self::Signer(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the transfer may or may not have moved funds.
    pub fn is_ambiguous_transfer(&self) -> bool {
        matches!(self, Self::ConfirmationTimeout { .. })
    }

    /// True when the ledger saw the transfer before it failed or stalled.
    pub fn transfer_was_submitted(&self) -> bool {
        matches!(
            self,
            Self::TransferFailed { .. } | Self::ConfirmationTimeout { .. }
        )
    }

    /// Handle of the transfer this error refers to, if it got that far.
    pub fn transfer_handle(&self) -> Option<&str> {
        match self {
            Self::TransferFailed { handle, .. } | Self::ConfirmationTimeout { handle, .. } => {
                Some(handle)
            }
            _ => None,
        }
    }
}
