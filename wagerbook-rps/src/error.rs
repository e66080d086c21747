use crate::wager::{WagerId, WagerState};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use wagerbook_core::WagerbookError;

pub type Result<T> = std::result::Result<T, WagerError>;

/// Caller-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    InsufficientBalance,
    WagerNotFound,
    WagerAlreadyResolved,
    WagerHasJoiner,
    ConcurrentJoinConflict,
    LedgerTransferFailed,
    LedgerConfirmationTimeout,
    PayoutFailed,
    PersistenceWriteFailure,
    LedgerUnavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::WagerNotFound => "WagerNotFound",
            ErrorKind::WagerAlreadyResolved => "WagerAlreadyResolved",
            ErrorKind::WagerHasJoiner => "WagerHasJoiner",
            ErrorKind::ConcurrentJoinConflict => "ConcurrentJoinConflict",
            ErrorKind::LedgerTransferFailed => "LedgerTransferFailed",
            ErrorKind::LedgerConfirmationTimeout => "LedgerConfirmationTimeout",
            ErrorKind::PayoutFailed => "PayoutFailed",
            ErrorKind::PersistenceWriteFailure => "PersistenceWriteFailure",
            ErrorKind::LedgerUnavailable => "LedgerUnavailable",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum WagerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient balance for '{owner}': need {need} sats, have {available} sats")]
    InsufficientBalance {
        owner: String,
        need: u64,
        available: u64,
    },

    #[error("Wager not found: {0}")]
    WagerNotFound(WagerId),

    #[error("Wager {0} is already resolved")]
    WagerAlreadyResolved(WagerId),

    #[error("Wager {0} already has a joiner")]
    WagerHasJoiner(WagerId),

    #[error("Another join for wager {0} is in progress")]
    ConcurrentJoinConflict(WagerId),

    #[error("Wager {id} cannot be settled while {state}")]
    NotSettleable { id: WagerId, state: WagerState },

    /// Nothing was escrowed. `submitted` says whether the ledger ever saw
    /// the transfer.
    #[error("Ledger transfer failed: {reason}")]
    LedgerTransferFailed {
        reason: String,
        submitted: bool,
        handle: Option<String>,
    },

    /// Funds may or may not have moved.
    #[error("Transfer {handle} is pending confirmation and under review")]
    LedgerConfirmationTimeout { handle: String },

    #[error("Payout for wager {id} failed and is under review: {reason}")]
    PayoutFailed { id: WagerId, reason: String },

    #[error("Failed to persist state: {0}")]
    PersistenceWriteFailure(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error(transparent)]
    Core(#[from] WagerbookError),
}

impl WagerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Classify the outcome of a ledger transfer attempt.
    pub fn from_transfer(err: WagerbookError) -> Self {
        match err {
            WagerbookError::TransferRejected { reason } => Self::LedgerTransferFailed {
                reason,
                submitted: false,
                handle: None,
            },
            WagerbookError::TransferFailed { handle, reason } => Self::LedgerTransferFailed {
                reason,
                submitted: true,
                handle: Some(handle),
            },
            WagerbookError::ConfirmationTimeout { handle, .. } => {
                Self::LedgerConfirmationTimeout { handle }
            }
            other => Self::from_query(other),
        }
    }

    /// Classify a failed balance query.
    pub fn from_query(err: WagerbookError) -> Self {
        match err {
            WagerbookError::Ledger(msg) | WagerbookError::Timeout(msg) => {
                Self::LedgerUnavailable(msg)
            }
            other => Self::Core(other),
        }
    }

    pub fn persistence(err: impl fmt::Display) -> Self {
        Self::PersistenceWriteFailure(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WagerError::InvalidInput(_) | WagerError::NotSettleable { .. } => {
                ErrorKind::InvalidInput
            }
            WagerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            WagerError::WagerNotFound(_) => ErrorKind::WagerNotFound,
            WagerError::WagerAlreadyResolved(_) => ErrorKind::WagerAlreadyResolved,
            WagerError::WagerHasJoiner(_) => ErrorKind::WagerHasJoiner,
            WagerError::ConcurrentJoinConflict(_) => ErrorKind::ConcurrentJoinConflict,
            WagerError::LedgerTransferFailed { .. } => ErrorKind::LedgerTransferFailed,
            WagerError::LedgerConfirmationTimeout { .. } => ErrorKind::LedgerConfirmationTimeout,
            WagerError::PayoutFailed { .. } => ErrorKind::PayoutFailed,
            WagerError::PersistenceWriteFailure(_) => ErrorKind::PersistenceWriteFailure,
            WagerError::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            WagerError::Core(err) => match err {
                WagerbookError::WalletNotFound { .. }
                | WagerbookError::WalletExists { .. }
                | WagerbookError::InvalidAddress(_) => ErrorKind::InvalidInput,
                WagerbookError::InsufficientFunds { .. } => ErrorKind::InsufficientBalance,
                WagerbookError::TransferRejected { .. } | WagerbookError::TransferFailed { .. } => {
                    ErrorKind::LedgerTransferFailed
                }
                WagerbookError::ConfirmationTimeout { .. } => {
                    ErrorKind::LedgerConfirmationTimeout
                }
                WagerbookError::Ledger(_) | WagerbookError::Timeout(_) => {
                    ErrorKind::LedgerUnavailable
                }
                WagerbookError::Persistence(_) => ErrorKind::PersistenceWriteFailure,
                _ => ErrorKind::Internal,
            },
        }
    }

    /// Outcome is not final; an operator has to look at it.
    pub fn is_under_review(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::LedgerConfirmationTimeout | ErrorKind::PayoutFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_errors_keep_submission_boundary() {
        let rejected = WagerError::from_transfer(WagerbookError::TransferRejected {
            reason: "overdraft".into(),
        });
        assert!(matches!(
            rejected,
            WagerError::LedgerTransferFailed { submitted: false, .. }
        ));

        let failed = WagerError::from_transfer(WagerbookError::TransferFailed {
            handle: "mem-1".into(),
            reason: "reorg".into(),
        });
        assert!(matches!(
            failed,
            WagerError::LedgerTransferFailed { submitted: true, .. }
        ));
        assert!(!failed.is_under_review());

        let timeout = WagerError::from_transfer(WagerbookError::ConfirmationTimeout {
            handle: "mem-2".into(),
            waited_ms: 10,
        });
        assert_eq!(timeout.kind(), ErrorKind::LedgerConfirmationTimeout);
        assert!(timeout.is_under_review());
    }

    #[test]
    fn test_core_errors_map_to_kinds() {
        let err = WagerError::from(WagerbookError::WalletNotFound {
            owner: "nobody".into(),
        });
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = WagerError::from_query(WagerbookError::Timeout("slow".into()));
        assert_eq!(err.kind(), ErrorKind::LedgerUnavailable);
    }
}
