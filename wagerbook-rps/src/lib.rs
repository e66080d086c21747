//! Two-party rock/paper/scissors wagers
//!
//! A creator escrows a stake into the settlement account and opens a wager.
//! The first joiner escrows the same stake, the outcome is resolved and the
//! pot is paid out: all of it to the winner, or each stake back on a tie.

pub mod error;
pub mod escrow;
pub mod events;
pub mod journal;
pub mod outcome;
pub mod reaper;
pub mod registry;
pub mod review;
pub mod service;
pub mod settle;
pub mod wager;

pub use error::{ErrorKind, Result, WagerError};
pub use escrow::EscrowOrchestrator;
pub use events::{BroadcastNotifier, LogNotifier, Notifier, NotifierRegistry, WagerEvent};
pub use journal::{EngineState, Journal};
pub use outcome::{resolve, Choice, Outcome};
pub use reaper::{ReaperHandle, WagerReaper};
pub use registry::{WagerLock, WagerRegistry};
pub use review::{ReviewItem, ReviewKind, ReviewQueue};
pub use service::{WagerListing, WagerService, WalletInfo, SETTLEMENT_OWNER};
pub use settle::{PayoutSettler, SettlementResult};
pub use wager::{LegStatus, PayoutLeg, Wager, WagerId, WagerResult, WagerState};
