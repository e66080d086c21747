//! Lifecycle events and the notifiers they fan out through.

use crate::wager::{Wager, WagerId};
use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WagerEvent {
    WagerCreated { wager: Wager },
    /// Post-join, pre-settlement view.
    WagerJoined { wager: Wager },
    WagerResolved { wager: Wager },
    WagerDeleted { wager_id: WagerId },
    BalanceUpdated { owner: String, balance: Amount },
}

impl WagerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WagerEvent::WagerCreated { .. } => "WagerCreated",
            WagerEvent::WagerJoined { .. } => "WagerJoined",
            WagerEvent::WagerResolved { .. } => "WagerResolved",
            WagerEvent::WagerDeleted { .. } => "WagerDeleted",
            WagerEvent::BalanceUpdated { .. } => "BalanceUpdated",
        }
    }
}

/// Receives events after the state change behind them is persisted.
///
/// Must return quickly and never block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: WagerEvent);
}

/// Fans events out to any number of subscribers. Slow subscribers lag and
/// lose events; publishing never waits.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<WagerEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WagerEvent> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: WagerEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: WagerEvent) {
        match &event {
            WagerEvent::WagerDeleted { wager_id } => {
                tracing::info!("event {} wager={}", event.name(), wager_id)
            }
            WagerEvent::BalanceUpdated { owner, balance } => {
                tracing::info!(
                    "event {} owner={} balance={}",
                    event.name(),
                    owner,
                    balance.to_sat()
                )
            }
            WagerEvent::WagerCreated { wager }
            | WagerEvent::WagerJoined { wager }
            | WagerEvent::WagerResolved { wager } => {
                tracing::info!("event {} wager={} state={}", event.name(), wager.id, wager.state)
            }
        }
    }
}

/// Sends every event to each registered notifier in turn.
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for NotifierRegistry {
    fn notify(&self, event: WagerEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Choice;

    #[test]
    fn test_events_are_tagged_json() {
        let wager = Wager::new("alice", Choice::Paper, Amount::from_sat(42));
        let json = serde_json::to_value(WagerEvent::WagerCreated { wager }).unwrap();
        assert_eq!(json["type"], "WagerCreated");
        assert_eq!(json["wager"]["creator"], "alice");
        assert_eq!(json["wager"]["creator_choice"], "paper");

        let json = serde_json::to_value(WagerEvent::BalanceUpdated {
            owner: "bob".into(),
            balance: Amount::from_sat(7),
        })
        .unwrap();
        assert_eq!(json["type"], "BalanceUpdated");
        assert_eq!(json["balance"], 7);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_does_not_block() {
        let notifier = BroadcastNotifier::new(1);
        for _ in 0..10 {
            notifier.notify(WagerEvent::WagerDeleted {
                wager_id: WagerId::new(),
            });
        }

        let mut rx = notifier.subscribe();
        let id = WagerId::new();
        notifier.notify(WagerEvent::WagerDeleted { wager_id: id });
        assert_eq!(rx.recv().await.unwrap(), WagerEvent::WagerDeleted { wager_id: id });
    }

    #[test]
    fn test_registry_fans_out() {
        let first = BroadcastNotifier::new(4);
        let second = BroadcastNotifier::new(4);
        let mut rx1 = first.subscribe();
        let mut rx2 = second.subscribe();

        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(first));
        registry.register(Box::new(second));
        registry.register(Box::new(LogNotifier));
        assert_eq!(registry.len(), 3);

        registry.notify(WagerEvent::WagerDeleted {
            wager_id: WagerId::new(),
        });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
