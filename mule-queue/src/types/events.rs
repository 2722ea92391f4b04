use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClaimantId, ItemId, QueueId};

/// Item lifecycle events broadcast by the store for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemEvent {
    /// Item entered the claim pool
    Created {
        item_id: ItemId,
        queue_id: QueueId,
        at: DateTime<Utc>,
    },

    /// Item was leased to a claimant
    Claimed {
        item_id: ItemId,
        claimant: ClaimantId,
        at: DateTime<Utc>,
    },

    /// Item finished successfully
    Completed { item_id: ItemId, at: DateTime<Utc> },

    /// Application failure sent the item back to the pool
    Retried {
        item_id: ItemId,
        retries: u32,
        at: DateTime<Utc>,
    },

    /// Item failed terminally with retries exhausted
    Exhausted {
        item_id: ItemId,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Item was abandoned
    Abandoned {
        item_id: ItemId,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Administrative requeue reset the item
    Requeued { item_id: ItemId, at: DateTime<Utc> },
}

impl ItemEvent {
    /// Get the event type name as a string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Claimed { .. } => "claimed",
            Self::Completed { .. } => "completed",
            Self::Retried { .. } => "retried",
            Self::Exhausted { .. } => "exhausted",
            Self::Abandoned { .. } => "abandoned",
            Self::Requeued { .. } => "requeued",
        }
    }

    /// Get the item ID from any event
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::Created { item_id, .. } => item_id,
            Self::Claimed { item_id, .. } => item_id,
            Self::Completed { item_id, .. } => item_id,
            Self::Retried { item_id, .. } => item_id,
            Self::Exhausted { item_id, .. } => item_id,
            Self::Abandoned { item_id, .. } => item_id,
            Self::Requeued { item_id, .. } => item_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Created { at, .. } => at,
            Self::Claimed { at, .. } => at,
            Self::Completed { at, .. } => at,
            Self::Retried { at, .. } => at,
            Self::Exhausted { at, .. } => at,
            Self::Abandoned { at, .. } => at,
            Self::Requeued { at, .. } => at,
        }
    }
}
