use crate::wager::WagerId;
use bitcoin::Amount;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// Creator's stake was submitted but never confirmed.
    CreateStakeUnconfirmed,
    /// Joiner's stake was submitted but never confirmed.
    JoinStakeUnconfirmed,
    WithdrawUnconfirmed,
    PayoutFailed,
    /// Restored from a snapshot taken in the middle of a join.
    InterruptedJoin,
    /// Creator's stake is escrowed but the wager could not be recorded.
    UnrecordedWager,
}

impl fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReviewKind::CreateStakeUnconfirmed => "create stake unconfirmed",
            ReviewKind::JoinStakeUnconfirmed => "join stake unconfirmed",
            ReviewKind::WithdrawUnconfirmed => "withdrawal unconfirmed",
            ReviewKind::PayoutFailed => "payout failed",
            ReviewKind::InterruptedJoin => "interrupted join",
            ReviewKind::UnrecordedWager => "unrecorded wager",
        };
        f.write_str(name)
    }
}

/// Funds whose whereabouts an operator has to confirm against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub kind: ReviewKind,
    pub wager_id: Option<WagerId>,
    pub owner: Option<String>,
    pub amount: Amount,
    pub transfer_handle: Option<String>,
    pub reason: String,
    pub filed_at: DateTime<Utc>,
}

impl ReviewItem {
    pub fn new(kind: ReviewKind, amount: Amount, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            wager_id: None,
            owner: None,
            amount,
            transfer_handle: None,
            reason: reason.into(),
            filed_at: Utc::now(),
        }
    }

    pub fn for_wager(mut self, wager_id: WagerId) -> Self {
        self.wager_id = Some(wager_id);
        self
    }

    pub fn for_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_handle(mut self, handle: Option<String>) -> Self {
        self.transfer_handle = handle;
        self
    }
}

#[derive(Default)]
pub struct ReviewQueue {
    items: RwLock<Vec<ReviewItem>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, item: ReviewItem) {
        tracing::warn!(
            "Filed for review: {} ({} sats, wager {:?}, handle {:?}): {}",
            item.kind,
            item.amount.to_sat(),
            item.wager_id.map(|id| id.to_string()),
            item.transfer_handle,
            item.reason
        );
        self.items.write().push(item);
    }

    pub fn list(&self) -> Vec<ReviewItem> {
        self.items.read().clone()
    }

    pub fn dismiss(&self, id: Uuid) -> Option<ReviewItem> {
        let mut items = self.items.write();
        let index = items.iter().position(|item| item.id == id)?;
        Some(items.remove(index))
    }

    /// Drop items of `kind` filed against `wager_id`; returns how many.
    pub fn clear_for(&self, wager_id: WagerId, kind: ReviewKind) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|item| !(item.wager_id == Some(wager_id) && item.kind == kind));
        before - items.len()
    }

    pub fn restore(&self, records: Vec<ReviewItem>) {
        *self.items.write() = records;
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_and_dismiss() {
        let queue = ReviewQueue::new();
        let item = ReviewItem::new(ReviewKind::WithdrawUnconfirmed, Amount::from_sat(9), "stalled")
            .for_owner("alice")
            .with_handle(Some("mem-00000001".into()));
        let id = item.id;
        queue.file(item);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.list()[0].owner.as_deref(), Some("alice"));
        assert!(queue.dismiss(Uuid::new_v4()).is_none());
        assert_eq!(queue.dismiss(id).unwrap().kind, ReviewKind::WithdrawUnconfirmed);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_for_wager_and_kind() {
        let queue = ReviewQueue::new();
        let wager_id = WagerId::new();
        queue.file(ReviewItem::new(ReviewKind::PayoutFailed, Amount::from_sat(1), "a").for_wager(wager_id));
        queue.file(ReviewItem::new(ReviewKind::PayoutFailed, Amount::from_sat(1), "b").for_wager(wager_id));
        queue.file(ReviewItem::new(ReviewKind::InterruptedJoin, Amount::ZERO, "c").for_wager(wager_id));

        assert_eq!(queue.clear_for(wager_id, ReviewKind::PayoutFailed), 2);
        assert_eq!(queue.list()[0].kind, ReviewKind::InterruptedJoin);
    }
}
