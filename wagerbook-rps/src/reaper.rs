use crate::error::{Result, WagerError};
use crate::events::WagerEvent;
use crate::journal::Journal;
use crate::wager::{WagerId, WagerState};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Deletes resolved wagers once they have been resolved for longer than
/// the retention window. Wagers in `PayoutFailed` are never touched.
pub struct WagerReaper {
    journal: Arc<Journal>,
    retention: chrono::Duration,
    interval: Duration,
}

impl WagerReaper {
    pub fn new(journal: Arc<Journal>, retention: Duration, interval: Duration) -> Result<Self> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| WagerError::invalid_input(format!("Invalid retention window: {}", e)))?;
        Ok(Self {
            journal,
            retention,
            interval,
        })
    }

    /// One sweep as of `now`. Returns the ids removed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Vec<WagerId>> {
        let registry = self.journal.registry();
        let expired: Vec<WagerId> = registry
            .all()
            .into_iter()
            .filter(|w| self.is_expired(w.state, w.resolved_at, now))
            .map(|w| w.id)
            .collect();

        let mut removed = Vec::new();
        for id in expired {
            // Busy wagers are left for the next sweep.
            let Ok(lock) = registry.try_lock(id) else {
                tracing::debug!("Skipping wager {} while it is locked", id);
                continue;
            };
            let wager = lock.wager();
            if !self.is_expired(wager.state, wager.resolved_at, now) {
                continue;
            }
            if let Some(wager) = registry.remove(&lock) {
                removed.push(wager);
            }
        }

        if removed.is_empty() {
            return Ok(Vec::new());
        }

        let events = removed
            .iter()
            .map(|w| WagerEvent::WagerDeleted { wager_id: w.id })
            .collect();
        if let Err(e) = self.journal.commit(events).await {
            // Put them back so the deletion is retried and announced once.
            for wager in removed {
                registry.insert(wager);
            }
            return Err(e);
        }

        let ids: Vec<WagerId> = removed.into_iter().map(|w| w.id).collect();
        tracing::info!("Reaped {} resolved wagers", ids.len());
        Ok(ids)
    }

    fn is_expired(
        &self,
        state: WagerState,
        resolved_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        state == WagerState::Resolved
            && resolved_at.is_some_and(|at| at + self.retention <= now)
    }

    /// Run sweeps every interval until the returned handle is shut down.
    pub fn spawn(self: Arc<Self>) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let reaper = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = reaper.run_once(Utc::now()).await {
                            tracing::warn!("Reaper sweep failed: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Reaper stopped");
        });

        ReaperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Reaper task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastNotifier;
    use crate::journal::EngineState;
    use crate::outcome::Choice;
    use crate::wager::Wager;
    use bitcoin::Amount;
    use wagerbook_core::{SnapshotStore, SqliteSnapshotStore};

    async fn journal() -> (Arc<Journal>, Arc<BroadcastNotifier>) {
        let notifier = Arc::new(BroadcastNotifier::new(64));
        let store: Arc<dyn SnapshotStore<EngineState>> =
            Arc::new(SqliteSnapshotStore::in_memory().await.unwrap());
        (Arc::new(Journal::new(store, notifier.clone())), notifier)
    }

    fn wager_in(state: WagerState, resolved_at: Option<DateTime<Utc>>) -> Wager {
        let mut wager = Wager::new("alice", Choice::Rock, Amount::from_sat(10));
        wager.state = state;
        wager.resolved_at = resolved_at;
        wager
    }

    #[tokio::test]
    async fn test_removes_only_expired_resolved_wagers() {
        let (journal, notifier) = journal().await;
        let mut events = notifier.subscribe();
        let now = Utc::now();
        let old = now - chrono::Duration::minutes(10);

        let expired = wager_in(WagerState::Resolved, Some(old));
        let fresh = wager_in(WagerState::Resolved, Some(now));
        let stranded = wager_in(WagerState::PayoutFailed, Some(old));
        let open = wager_in(WagerState::AwaitingJoiner, None);
        let expired_id = expired.id;
        for wager in [expired, fresh, stranded, open] {
            journal.registry().insert(wager);
        }

        let reaper = WagerReaper::new(journal.clone(), Duration::from_secs(300), Duration::from_secs(60))
            .unwrap();
        assert_eq!(reaper.run_once(now).await.unwrap(), vec![expired_id]);
        assert_eq!(journal.registry().len(), 3);
        assert!(journal.registry().get(expired_id).is_err());

        // A second sweep finds nothing and announces nothing new.
        assert!(reaper.run_once(now).await.unwrap().is_empty());
        assert_eq!(
            events.try_recv().unwrap(),
            WagerEvent::WagerDeleted { wager_id: expired_id }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_skips_locked_wager() {
        let (journal, _) = journal().await;
        let now = Utc::now();
        let wager = wager_in(WagerState::Resolved, Some(now - chrono::Duration::hours(1)));
        let id = wager.id;
        journal.registry().insert(wager);

        let reaper = WagerReaper::new(journal.clone(), Duration::from_secs(300), Duration::from_secs(60))
            .unwrap();
        let held = journal.registry().try_lock(id).unwrap();
        assert!(reaper.run_once(now).await.unwrap().is_empty());
        drop(held);

        assert_eq!(reaper.run_once(now).await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_spawned_reaper_sweeps_and_stops() {
        let (journal, notifier) = journal().await;
        let mut events = notifier.subscribe();
        let wager = wager_in(WagerState::Resolved, Some(Utc::now() - chrono::Duration::hours(1)));
        let id = wager.id;
        journal.registry().insert(wager);

        let reaper = Arc::new(
            WagerReaper::new(journal.clone(), Duration::from_secs(1), Duration::from_millis(10))
                .unwrap(),
        );
        let handle = reaper.spawn();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, WagerEvent::WagerDeleted { wager_id: id });

        handle.shutdown().await;
        assert!(journal.registry().is_empty());
    }
}
