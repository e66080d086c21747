//! Wager lifecycle storage.
//!
//! Every wager has its own join lock. Holding it is the only way to move a
//! wager through `JoinInProgress`, settle it or delete it. Reads take a
//! short synchronous lock and never wait behind a join.

use crate::error::{Result, WagerError};
use crate::wager::{Wager, WagerId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct WagerSlot {
    join_lock: Arc<Mutex<()>>,
    data: RwLock<Wager>,
}

impl WagerSlot {
    fn new(wager: Wager) -> Self {
        Self {
            join_lock: Arc::new(Mutex::new(())),
            data: RwLock::new(wager),
        }
    }
}

/// Exclusive hold on one wager.
pub struct WagerLock {
    slot: Arc<WagerSlot>,
    _permit: OwnedMutexGuard<()>,
}

impl WagerLock {
    pub fn wager(&self) -> Wager {
        self.slot.data.read().clone()
    }

    pub fn id(&self) -> WagerId {
        self.slot.data.read().id
    }

    /// Apply `change` and return the resulting wager.
    pub fn update<F>(&self, change: F) -> Wager
    where
        F: FnOnce(&mut Wager),
    {
        let mut wager = self.slot.data.write();
        change(&mut wager);
        wager.clone()
    }
}

#[derive(Default)]
pub struct WagerRegistry {
    wagers: RwLock<HashMap<WagerId, Arc<WagerSlot>>>,
}

impl WagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, wager: Wager) {
        self.wagers
            .write()
            .insert(wager.id, Arc::new(WagerSlot::new(wager)));
    }

    /// Insert a new wager with its lock already held by the caller, so no
    /// one can join it before the caller lets go.
    pub fn insert_locked(&self, wager: Wager) -> Result<WagerLock> {
        let id = wager.id;
        let slot = Arc::new(WagerSlot::new(wager));
        let permit = slot
            .join_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| WagerError::ConcurrentJoinConflict(id))?;
        self.wagers.write().insert(id, slot.clone());
        Ok(WagerLock {
            slot,
            _permit: permit,
        })
    }

    pub fn get(&self, id: WagerId) -> Result<Wager> {
        Ok(self.slot(id)?.data.read().clone())
    }

    fn slot(&self, id: WagerId) -> Result<Arc<WagerSlot>> {
        self.wagers
            .read()
            .get(&id)
            .cloned()
            .ok_or(WagerError::WagerNotFound(id))
    }

    /// Take the wager's lock without waiting; a held lock means another
    /// caller is already working on it.
    pub fn try_lock(&self, id: WagerId) -> Result<WagerLock> {
        let slot = self.slot(id)?;
        let permit = slot
            .join_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| WagerError::ConcurrentJoinConflict(id))?;
        Ok(WagerLock {
            slot,
            _permit: permit,
        })
    }

    /// Remove a wager the caller holds the lock for.
    pub fn remove(&self, lock: &WagerLock) -> Option<Wager> {
        let id = lock.id();
        self.wagers
            .write()
            .remove(&id)
            .map(|slot| slot.data.read().clone())
    }

    /// All wagers, oldest first.
    pub fn all(&self) -> Vec<Wager> {
        let mut wagers: Vec<Wager> = self
            .wagers
            .read()
            .values()
            .map(|slot| slot.data.read().clone())
            .collect();
        wagers.sort_by_key(|w| w.id);
        wagers
    }

    pub fn restore(&self, records: Vec<Wager>) {
        let mut wagers = self.wagers.write();
        wagers.clear();
        for wager in records {
            wagers.insert(wager.id, Arc::new(WagerSlot::new(wager)));
        }
    }

    pub fn len(&self) -> usize {
        self.wagers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Choice;
    use crate::wager::WagerState;
    use bitcoin::Amount;

    fn registry_with_wager() -> (WagerRegistry, WagerId) {
        let registry = WagerRegistry::new();
        let wager = Wager::new("alice", Choice::Rock, Amount::from_sat(500));
        let id = wager.id;
        registry.insert(wager);
        (registry, id)
    }

    #[test]
    fn test_second_lock_is_a_conflict() {
        let (registry, id) = registry_with_wager();
        let _held = registry.try_lock(id).unwrap();

        let err = registry.try_lock(id).err().unwrap();
        assert!(matches!(err, WagerError::ConcurrentJoinConflict(_)));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let (registry, id) = registry_with_wager();
        {
            let lock = registry.try_lock(id).unwrap();
            lock.update(|w| w.state = WagerState::JoinInProgress);
        }
        assert!(registry.try_lock(id).is_ok());
        assert_eq!(registry.get(id).unwrap().state, WagerState::JoinInProgress);
    }

    #[test]
    fn test_reads_do_not_wait_for_lock() {
        let (registry, id) = registry_with_wager();
        let _held = registry.try_lock(id).unwrap();
        assert_eq!(registry.all().len(), 1);
        assert_eq!(registry.get(id).unwrap().creator, "alice");
    }

    #[test]
    fn test_inserted_locked_wager_cannot_be_joined() {
        let registry = WagerRegistry::new();
        let wager = Wager::new("alice", Choice::Paper, Amount::from_sat(500));
        let id = wager.id;

        let lock = registry.insert_locked(wager).unwrap();
        assert!(matches!(
            registry.try_lock(id).err().unwrap(),
            WagerError::ConcurrentJoinConflict(_)
        ));

        registry.remove(&lock);
        drop(lock);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_wager() {
        let registry = WagerRegistry::new();
        let err = registry.get(WagerId::new()).unwrap_err();
        assert!(matches!(err, WagerError::WagerNotFound(_)));
    }

    #[test]
    fn test_remove_under_lock() {
        let (registry, id) = registry_with_wager();
        let lock = registry.try_lock(id).unwrap();
        assert!(registry.remove(&lock).is_some());
        drop(lock);
        assert!(registry.is_empty());
    }
}
