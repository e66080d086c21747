use crate::error::WagerError;
use crate::outcome::{Choice, Outcome};
use bitcoin::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use wagerbook_core::WagerbookError;

/// Time-ordered wager identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WagerId(Uuid);

impl WagerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WagerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for WagerId {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| WagerError::invalid_input(format!("Invalid wager id '{}': {}", s, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerState {
    AwaitingJoiner,
    JoinInProgress,
    Resolved,
    /// Stakes are escrowed but not (fully) paid out. Only an operator
    /// retry moves it on.
    PayoutFailed,
}

impl fmt::Display for WagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerState::AwaitingJoiner => write!(f, "awaiting joiner"),
            WagerState::JoinInProgress => write!(f, "join in progress"),
            WagerState::Resolved => write!(f, "resolved"),
            WagerState::PayoutFailed => write!(f, "payout failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerResult {
    pub outcome: Outcome,
    /// Owner who took the pot; `None` on a tie.
    pub winner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
}

/// One transfer out of the settlement account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLeg {
    pub recipient: String,
    pub amount: Amount,
    /// Reused on retry so the ledger pays the leg at most once.
    pub idempotency_key: Uuid,
    pub handle: Option<String>,
    pub status: LegStatus,
}

impl PayoutLeg {
    pub fn new(recipient: impl Into<String>, amount: Amount) -> Self {
        Self {
            recipient: recipient.into(),
            amount,
            idempotency_key: Uuid::new_v4(),
            handle: None,
            status: LegStatus::Pending,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == LegStatus::Confirmed
    }

    pub(crate) fn confirm(&mut self, handle: String) {
        self.handle = Some(handle);
        self.status = LegStatus::Confirmed;
    }

    pub(crate) fn fail(&mut self, err: &WagerbookError) {
        self.handle = err.transfer_handle().map(str::to_string);
        self.status = LegStatus::Failed {
            reason: err.to_string(),
        };
        // The ledger settled this key as failed and returned the funds;
        // a retry needs a fresh one. Ambiguous legs keep theirs.
        if matches!(err, WagerbookError::TransferFailed { .. }) {
            self.idempotency_key = Uuid::new_v4();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub creator: String,
    pub creator_choice: Choice,
    pub stake: Amount,
    pub joiner: Option<String>,
    pub joiner_choice: Option<Choice>,
    pub state: WagerState,
    pub result: Option<WagerResult>,
    #[serde(default)]
    pub payouts: Vec<PayoutLeg>,
    pub created_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Wager {
    pub fn new(creator: impl Into<String>, creator_choice: Choice, stake: Amount) -> Self {
        Self {
            id: WagerId::new(),
            creator: creator.into(),
            creator_choice,
            stake,
            joiner: None,
            joiner_choice: None,
            state: WagerState::AwaitingJoiner,
            result: None,
            payouts: Vec::new(),
            created_at: Utc::now(),
            joined_at: None,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state == WagerState::Resolved
    }

    /// Both stakes together.
    pub fn pot(&self) -> Amount {
        self.stake * 2
    }

    /// Owner entitled to the pot for a decisive outcome.
    pub fn winner_for(&self, outcome: Outcome) -> Option<&str> {
        match outcome {
            Outcome::Tie => None,
            Outcome::FirstWins => Some(&self.creator),
            Outcome::SecondWins => self.joiner.as_deref(),
        }
    }

    pub(crate) fn clear_joiner(&mut self) {
        self.joiner = None;
        self.joiner_choice = None;
        self.joined_at = None;
        self.state = WagerState::AwaitingJoiner;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wager_ids_are_time_ordered() {
        let first = WagerId::new();
        let second = WagerId::new();
        assert!(first < second);
        assert_eq!(first.to_string().parse::<WagerId>().unwrap(), first);
    }

    #[test]
    fn test_resolved_wager_round_trips() {
        let mut wager = Wager::new("alice", Choice::Rock, Amount::from_sat(1_000));
        wager.joiner = Some("bob".into());
        wager.joiner_choice = Some(Choice::Scissors);
        wager.state = WagerState::Resolved;
        wager.result = Some(WagerResult {
            outcome: Outcome::FirstWins,
            winner: Some("alice".into()),
        });
        let mut leg = PayoutLeg::new("alice", wager.pot());
        leg.confirm("mem-00000003".into());
        wager.payouts.push(leg);
        wager.joined_at = Some(Utc::now());
        wager.resolved_at = Some(Utc::now());

        let json = serde_json::to_string(&wager).unwrap();
        let restored: Wager = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, wager);
        assert!(restored.is_resolved());
    }

    #[test]
    fn test_failed_leg_rotates_key_only_when_definitive() {
        let mut leg = PayoutLeg::new("bob", Amount::from_sat(10));
        let original = leg.idempotency_key;

        leg.fail(&WagerbookError::ConfirmationTimeout {
            handle: "mem-1".into(),
            waited_ms: 5,
        });
        assert_eq!(leg.idempotency_key, original);
        assert_eq!(leg.handle.as_deref(), Some("mem-1"));

        leg.fail(&WagerbookError::TransferFailed {
            handle: "mem-1".into(),
            reason: "dropped".into(),
        });
        assert_ne!(leg.idempotency_key, original);
    }
}
