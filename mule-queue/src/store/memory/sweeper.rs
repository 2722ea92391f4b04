use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::store::ItemStore;
use crate::{QueueId, QueueResult};

/// Default bound after which an InProgress lease is considered dead
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Periodic abandonment of long-stale leases.
///
/// Independent of the visibility-timeout reclaim inside `claim_batch`: the
/// sweeper fires on a much larger age threshold and moves items to Abandoned
/// instead of back into the pool. The scheduler also runs `sweep_once` inline
/// before each queue-trigger poll.
pub struct LeaseSweeper<S: ItemStore> {
    store: Arc<S>,
    stale_after: Duration,
    interval: Duration,
}

/// Handle for stopping a running sweeper task
pub struct SweeperHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Gracefully stop the sweeper
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.await;
    }
}

impl<S: ItemStore + 'static> LeaseSweeper<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            stale_after: DEFAULT_STALE_AFTER,
            interval: Duration::from_secs(60),
        }
    }

    /// Create a sweeper with custom stale bound and cadence
    pub fn with_bounds(store: Arc<S>, stale_after: Duration, interval: Duration) -> Self {
        Self {
            store,
            stale_after,
            interval,
        }
    }

    /// Run one sweep cycle over all queues (or a single queue)
    pub async fn sweep_once(&self, queue_id: Option<&QueueId>) -> QueueResult<usize> {
        let abandoned = self.store.sweep_stale(queue_id, self.stale_after).await?;
        Ok(abandoned.len())
    }

    /// Start the background sweep task
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            info!("Starting lease sweeper with interval: {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Lease sweeper shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.sweep_once(None).await {
                            Ok(0) => debug!("No stale leases found"),
                            Ok(count) => info!("Abandoned {} stale leases", count),
                            Err(e) => warn!("Error during lease sweep: {}", e),
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown_tx,
            join_handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::{ClaimantId, ItemStatus, ItemSubmission, QueueSpec};

    #[tokio::test]
    async fn test_sweep_once_abandons_stale_lease() {
        let store = Arc::new(MemoryStore::new());
        let queue = store.create_queue(QueueSpec::new("work")).await.unwrap();
        let item = store
            .push_item(&queue.id, ItemSubmission::new(b"x".to_vec()))
            .await
            .unwrap();

        store
            .claim_batch(
                &queue.id,
                &ClaimantId::from("w1"),
                1,
                Duration::from_secs(300),
            )
            .await
            .unwrap();
        store
            .backdate_lock(&item.id, Duration::from_secs(25 * 60 * 60))
            .unwrap();

        let sweeper = LeaseSweeper::new(store.clone());
        let count = sweeper.sweep_once(None).await.unwrap();
        assert_eq!(count, 1);

        let record = store.get_item(&item.id).await.unwrap();
        assert_eq!(record.status, ItemStatus::Abandoned);
        assert!(record.locked_by.is_none() && record.locked_at.is_none());
    }

    #[tokio::test]
    async fn test_sweep_ignores_active_leases() {
        let store = Arc::new(MemoryStore::new());
        let queue = store.create_queue(QueueSpec::new("work")).await.unwrap();
        store
            .push_item(&queue.id, ItemSubmission::new(b"x".to_vec()))
            .await
            .unwrap();
        store
            .claim_batch(
                &queue.id,
                &ClaimantId::from("w1"),
                1,
                Duration::from_secs(300),
            )
            .await
            .unwrap();

        let sweeper = LeaseSweeper::new(store.clone());
        assert_eq!(sweeper.sweep_once(None).await.unwrap(), 0);
    }
}
