//! # mule-queue: Work-Queue Claiming Infrastructure
//!
//! **At-most-one-claimant item queues with lease and retry semantics**
//!
//! mule-queue is the claiming core of MuleRS. Producers push opaque items
//! into named queues; many concurrent claimants (external workers and the
//! trigger scheduler alike) pull them through a single atomic claim
//! primitive, so no item is ever processed by two claimants at once:
//!
//! - **Atomic claiming**: selection and locking are one indivisible
//!   conditional update, never a read-then-write
//! - **Lease-based ownership**: a claim is a visibility-timeout lease, not a
//!   permanent assignment; dead claimants lose their items back to the pool
//! - **Retry contract**: application failures requeue until the queue's
//!   retry budget is spent, business failures are terminal immediately
//! - **Stale-lease sweeping**: leases nobody reclaimed within the long stale
//!   bound are abandoned with a fixed reason
//! - **Structured observability**: every item transition is broadcast as an
//!   [`ItemEvent`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use mule_queue::prelude::*;
//! use mule_queue::store::memory::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), mule_queue::QueueError> {
//! let adapter = QueueAdapter::new(Arc::new(MemoryStore::new()));
//!
//! let queue = adapter
//!     .create_queue("ops", QueueSpec::new("invoices").with_max_retries(2))
//!     .await?;
//! adapter
//!     .submit_item(&queue.id, ItemSubmission::new(b"invoice-77".to_vec()))
//!     .await?;
//!
//! let claimant = ClaimantId::from("worker-1");
//! for item in adapter.claim_next(&queue.id, &claimant, 1).await? {
//!     adapter
//!         .update_status(&item.id, &claimant, StatusUpdate::done(None))
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;
pub mod store;
pub mod types;

pub use adapter::{QueueAdapter, QueueConfig, StatusUpdate};
pub use error::{QueueError, QueueResult};
pub use store::{ItemDisposition, ItemStore, JobOutcome};
pub use types::{
    ClaimantId, ClaimedItem, FailureKind, ItemEvent, ItemId, ItemRecord, ItemStatus,
    ItemSubmission, QueueId, QueueRecord, QueueSpec, QueueUpdate,
};

#[cfg(feature = "memory")]
pub use store::memory::{LeaseSweeper, MemoryStore, SweeperHandle};

/// Prelude for the common claiming surface
pub mod prelude {
    pub use crate::adapter::{QueueAdapter, QueueConfig, StatusUpdate};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::store::{ItemDisposition, ItemStore, JobOutcome};
    pub use crate::types::{
        ClaimantId, ClaimedItem, FailureKind, ItemEvent, ItemId, ItemRecord, ItemStatus,
        ItemSubmission, QueueId, QueueRecord, QueueSpec, QueueUpdate,
    };

    #[cfg(feature = "memory")]
    pub use crate::store::memory::{LeaseSweeper, MemoryStore};
}
