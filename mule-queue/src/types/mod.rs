pub mod events;
pub mod ids;
pub mod item;
pub mod queue;

pub use events::ItemEvent;
pub use ids::{ClaimantId, ItemId, QueueId};
pub use item::{ClaimedItem, FailureKind, ItemRecord, ItemStatus, ItemSubmission};
pub use queue::{QueueRecord, QueueSpec, QueueUpdate};
