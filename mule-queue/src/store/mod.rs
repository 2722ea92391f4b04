#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use futures_core::Stream;
use mule_core::JobId;
use std::pin::Pin;
use std::time::Duration;

use crate::{
    ClaimantId, ClaimedItem, FailureKind, ItemEvent, ItemId, ItemRecord, ItemStatus,
    ItemSubmission, QueueId, QueueRecord, QueueResult, QueueSpec, QueueUpdate,
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Terminal disposition reported by the claimant holding an item's lease
#[derive(Debug, Clone)]
pub enum ItemDisposition {
    /// Processed successfully
    Done { output: Option<Vec<u8>> },

    /// Processing failed; `kind` decides between requeue and terminal failure
    Failed { kind: FailureKind, reason: String },

    /// The claimant gives the item up permanently
    Abandoned { reason: String },
}

/// Terminal outcome of the job linked to a set of items (bridge path)
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed,
    Failed { error: Option<String> },
}

/// Storage primitives for queues and their items.
///
/// The concurrency contract lives here: `claim_batch` and `resolve_item` are
/// single indivisible conditional updates — selection and locking happen in
/// one operation, so two claimants can never take the same row and a stale
/// claimant can never overwrite a reassigned item.
#[async_trait]
pub trait ItemStore: Send + Sync {
    // --- queue definitions (thin CRUD) ---

    async fn create_queue(&self, spec: QueueSpec) -> QueueResult<QueueRecord>;

    async fn get_queue(&self, id: &QueueId) -> QueueResult<QueueRecord>;

    async fn list_queues(&self) -> QueueResult<Vec<QueueRecord>>;

    /// Update mutable queue fields. `enforce_unique_reference` is immutable
    /// and not part of [`QueueUpdate`].
    async fn update_queue(&self, id: &QueueId, update: QueueUpdate) -> QueueResult<QueueRecord>;

    /// Delete a queue and every item in it
    async fn delete_queue(&self, id: &QueueId) -> QueueResult<()>;

    // --- items ---

    /// Insert a new item into the claim pool. Rejected with
    /// [`crate::QueueError::DuplicateReference`] when the queue enforces
    /// unique references and the reference is already present.
    async fn push_item(
        &self,
        queue_id: &QueueId,
        submission: ItemSubmission,
    ) -> QueueResult<ItemRecord>;

    async fn get_item(&self, id: &ItemId) -> QueueResult<ItemRecord>;

    async fn list_items(
        &self,
        queue_id: &QueueId,
        status: Option<ItemStatus>,
    ) -> QueueResult<Vec<ItemRecord>>;

    /// Atomically select and lease up to `batch_size` eligible items.
    ///
    /// Eligible: status New, or InProgress with `locked_at` older than
    /// `visibility`. Ordered by priority descending, then created_at
    /// ascending. An empty result is a normal outcome.
    async fn claim_batch(
        &self,
        queue_id: &QueueId,
        claimant: &ClaimantId,
        batch_size: usize,
        visibility: Duration,
    ) -> QueueResult<Vec<ClaimedItem>>;

    /// Apply a terminal disposition under the lease held by `claimant`.
    ///
    /// Fails with [`crate::QueueError::LeaseConflict`] unless the item is
    /// InProgress, `locked_by == claimant`, and the lease is younger than
    /// `visibility`. Application failures below the queue's max_retries
    /// increment `retries` and send the item back to New; everything else
    /// lands terminally per the status contract.
    async fn resolve_item(
        &self,
        id: &ItemId,
        claimant: &ClaimantId,
        disposition: ItemDisposition,
        visibility: Duration,
    ) -> QueueResult<ItemRecord>;

    /// Administrative requeue: allowed only from terminal Failed; resets
    /// retries to 0 and returns the item to the pool.
    async fn requeue_item(&self, id: &ItemId) -> QueueResult<ItemRecord>;

    /// Abandon InProgress items whose lease is older than `stale_after`,
    /// with the fixed reason "lease expired". Safe to interleave with claims:
    /// it is itself a conditional update over a different age threshold.
    async fn sweep_stale(
        &self,
        queue_id: Option<&QueueId>,
        stale_after: Duration,
    ) -> QueueResult<Vec<ItemRecord>>;

    /// Record the job now carrying these items
    async fn link_job(&self, item_ids: &[ItemId], job_id: &JobId) -> QueueResult<()>;

    /// Bulk-apply a job's terminal outcome to its linked, not-yet-terminal
    /// items: completed → Done; failed → terminal Failed, copying the job's
    /// error into `error_reason` only when the item has none of its own.
    /// Returns the items that changed.
    async fn finalize_for_job(
        &self,
        job_id: &JobId,
        outcome: JobOutcome,
    ) -> QueueResult<Vec<ItemRecord>>;

    /// Event stream for observability (boxed for stable Rust)
    fn event_stream(&self) -> BoxStream<ItemEvent>;
}
