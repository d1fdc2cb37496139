//! Per interface-pair locks
//!
//! Serializes the existence check, allocation and persist steps for the same
//! pair of tunnel endpoints within this process, so two overlapping mesh
//! requests cannot create duplicate tunnels between the same interfaces.
//! An entry lives only while someone holds or waits for it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// `(device, interface)` at one end of a tunnel
pub type Endpoint = (Uuid, Uuid);

type PairKey = (String, Endpoint, Endpoint);

/// Tracks one async mutex per unordered endpoint pair
#[derive(Debug, Default)]
pub struct PairLocks {
    locks: DashMap<PairKey, Arc<Mutex<()>>>,
}

/// Exclusive access to one endpoint pair
///
/// Dropping the guard unlocks the pair and forgets it once nobody else is
/// waiting.
#[derive(Debug)]
pub struct PairGuard<'a> {
    locks: &'a PairLocks,
    key: PairKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the pair `a`/`b` in `org`
    ///
    /// The order of `a` and `b` does not matter.
    pub async fn lock(&self, org: &str, a: Endpoint, b: Endpoint) -> PairGuard<'_> {
        let key = if a <= b {
            (org.to_string(), a, b)
        } else {
            (org.to_string(), b, a)
        };

        // Clone out of the map before awaiting so no shard lock is held
        let mutex = self.locks.entry(key.clone()).or_default().value().clone();
        let guard = mutex.lock_owned().await;

        PairGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone of the mutex; only the map's own reference left
        // means the pair is idle. Cloning in `lock` happens under the same
        // shard lock, so no waiter can slip in between.
        self.locks
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn endpoint() -> Endpoint {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_lock_is_order_independent() {
        let locks = PairLocks::new();
        let (a, b) = (endpoint(), endpoint());

        let guard = locks.lock("org-1", a, b).await;

        // Same pair in reverse must wait
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), locks.lock("org-1", b, a)).await;
        assert!(blocked.is_err());

        // Another org uses its own lock
        let other =
            tokio::time::timeout(Duration::from_millis(50), locks.lock("org-2", a, b)).await;
        assert!(other.is_ok());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), locks.lock("org-1", b, a)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_released_pairs_are_forgotten() {
        let locks = PairLocks::new();
        let held = locks.lock("org-1", endpoint(), endpoint()).await;
        drop(locks.lock("org-1", endpoint(), endpoint()).await);

        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_a_waiter_is_queued() {
        let locks = Arc::new(PairLocks::new());
        let (a, b) = (endpoint(), endpoint());
        let guard = locks.lock("org-1", a, b).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("org-1", b, a).await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1, "waiter still references the pair");

        let held_while_waiting = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(held_while_waiting, 1);
        assert!(locks.is_empty());
    }
}
