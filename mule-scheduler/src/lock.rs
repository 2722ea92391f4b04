//! Mutual exclusion for scheduler ticks across horizontally-scaled instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Proof of leadership for one tick.
///
/// Acquired fresh at the start of every tick and passed into the evaluation
/// call; there is no process-wide "is leader" flag.
#[derive(Debug, Clone)]
pub struct LeaderLease {
    pub key: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A set-if-absent-with-expiry lock against a shared store.
///
/// The TTL must exceed the worst-case tick duration so leadership cannot
/// change hands mid-tick, while staying short enough that a crashed leader
/// is succeeded within a tick interval or two.
#[async_trait]
pub trait LeaderLock: Send + Sync {
    /// Attempt to take the lock. The current holder may re-enter its own
    /// unexpired lock; re-acquisition refreshes the expiry.
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Option<LeaderLease>;

    /// Drop the lock early. A no-op unless `lease.holder` still holds it.
    async fn release(&self, lease: &LeaderLease);
}

/// Shared-cache lock implementation.
///
/// Clones share one entry map, so several scheduler "instances" in one
/// process contend on the same store the way separate processes would
/// contend on a shared cache.
#[derive(Clone, Default)]
pub struct CacheLock {
    entries: Arc<Mutex<HashMap<String, (String, DateTime<Utc>)>>>,
}

impl CacheLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaderLock for CacheLock {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Option<LeaderLease> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::max_value());

        let mut entries = self.entries.lock();
        if let Some((current, expires_at)) = entries.get(key) {
            if *expires_at > now && current != holder {
                return None;
            }
        }

        let expires_at = now + ttl;
        entries.insert(key.to_string(), (holder.to_string(), expires_at));
        Some(LeaderLease {
            key: key.to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at,
        })
    }

    async fn release(&self, lease: &LeaderLease) {
        let mut entries = self.entries.lock();
        if let Some((current, _)) = entries.get(&lease.key) {
            if *current == lease.holder {
                entries.remove(&lease.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_only_one_holder_wins() {
        let lock = CacheLock::new();

        let winner = lock.try_acquire("scheduler", "a", TTL).await;
        assert!(winner.is_some());

        let loser = lock.try_acquire("scheduler", "b", TTL).await;
        assert!(loser.is_none());
    }

    #[tokio::test]
    async fn test_holder_reenters_its_own_lock() {
        let lock = CacheLock::new();

        let first = lock.try_acquire("scheduler", "a", TTL).await.unwrap();
        let second = lock.try_acquire("scheduler", "a", TTL).await.unwrap();
        assert!(second.expires_at >= first.expires_at);
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let lock = CacheLock::new();

        lock.try_acquire("scheduler", "a", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let takeover = lock.try_acquire("scheduler", "b", TTL).await;
        assert!(takeover.is_some());
    }

    #[tokio::test]
    async fn test_release_frees_the_lock_for_others() {
        let lock = CacheLock::new();

        let lease = lock.try_acquire("scheduler", "a", TTL).await.unwrap();
        lock.release(&lease).await;

        assert!(lock.try_acquire("scheduler", "b", TTL).await.is_some());
    }

    #[tokio::test]
    async fn test_release_by_stale_holder_is_a_noop() {
        let lock = CacheLock::new();

        let old = lock
            .try_acquire("scheduler", "a", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.try_acquire("scheduler", "b", TTL).await.unwrap();

        // The displaced holder's release must not free b's lock
        lock.release(&old).await;
        assert!(lock.try_acquire("scheduler", "c", TTL).await.is_none());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let lock = CacheLock::new();

        assert!(lock.try_acquire("scheduler/eu", "a", TTL).await.is_some());
        assert!(lock.try_acquire("scheduler/us", "b", TTL).await.is_some());
    }
}
