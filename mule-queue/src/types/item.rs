use chrono::{DateTime, Duration, Utc};
use mule_core::JobId;
use serde::{Deserialize, Serialize};

use super::{ClaimantId, ItemId, QueueId};

/// Queue item lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Waiting in the claim pool
    New,

    /// Leased to exactly one claimant
    InProgress,

    /// Processed successfully
    Done,

    /// Failed with retries exhausted
    Failed,

    /// Given up on without completing (manual or stale-lease sweep)
    Abandoned,
}

impl ItemStatus {
    /// Check if the status is terminal (no further automatic transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Abandoned)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Failure classification reported by a claimant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Infrastructure fault; the item re-enters the pool while retries remain
    Application,

    /// The work itself is invalid; terminal immediately
    Business,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Business => "business",
        }
    }
}

/// Data submitted by a producer when enqueuing an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSubmission {
    /// Optional business key, unique within the queue when the queue enforces it
    pub reference: Option<String>,

    /// Higher priority is served first
    pub priority: i32,

    /// Opaque payload handed to whichever job processes the item
    pub payload: Vec<u8>,
}

impl ItemSubmission {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            reference: None,
            priority: 0,
            payload,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Queue item record - mutable runtime state stored by the item store.
///
/// Invariants upheld by the mutation helpers:
/// - `locked_by`/`locked_at` are both set iff status is InProgress
/// - Done items never carry error fields
/// - Failed items always carry `error_kind` and `error_reason`
/// - Abandoned items always carry `error_reason` and cleared lease fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub queue_id: QueueId,
    pub reference: Option<String>,
    pub status: ItemStatus,
    pub priority: i32,
    pub payload: Vec<u8>,

    /// Result payload, set only on Done
    pub output: Option<Vec<u8>>,

    /// Set only on Failed
    pub error_kind: Option<FailureKind>,

    /// Set on Failed and Abandoned
    pub error_reason: Option<String>,

    /// Attempt counter; raised to at least the queue's max_retries on any
    /// terminal failure (the exhaustion marker)
    pub retries: u32,

    pub locked_by: Option<ClaimantId>,
    pub locked_at: Option<DateTime<Utc>>,

    /// Job currently or last processing this item
    pub job_id: Option<JobId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ItemRecord {
    /// Create a new item in the claim pool
    pub fn new(queue_id: QueueId, submission: ItemSubmission) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            queue_id,
            reference: submission.reference,
            status: ItemStatus::New,
            priority: submission.priority,
            payload: submission.payload,
            output: None,
            error_kind: None,
            error_reason: None,
            retries: 0,
            locked_by: None,
            locked_at: None,
            job_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Check if an InProgress lease is older than the given window
    pub fn lease_older_than(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match (self.status, self.locked_at) {
            (ItemStatus::InProgress, Some(locked_at)) => locked_at + window < now,
            _ => false,
        }
    }

    /// Check if the item is eligible for claiming: New, or InProgress with a
    /// lease older than the visibility timeout
    pub fn claimable(&self, visibility: Duration, now: DateTime<Utc>) -> bool {
        match self.status {
            ItemStatus::New => true,
            ItemStatus::InProgress => self.lease_older_than(visibility, now),
            _ => false,
        }
    }

    /// Lease the item to a claimant
    pub fn claim(&mut self, claimant: ClaimantId, now: DateTime<Utc>) {
        self.status = ItemStatus::InProgress;
        self.locked_by = Some(claimant);
        self.locked_at = Some(now);
        self.updated_at = now;
    }

    /// Complete the item successfully
    pub fn complete(&mut self, output: Option<Vec<u8>>, now: DateTime<Utc>) {
        self.status = ItemStatus::Done;
        self.output = output;
        self.error_kind = None;
        self.error_reason = None;
        self.clear_lease(now);
        self.completed_at = Some(now);
    }

    /// Send the item back to the pool for another attempt
    pub fn retry(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::New;
        self.retries += 1;
        self.error_kind = None;
        self.error_reason = None;
        self.clear_lease(now);
    }

    /// Fail the item terminally, raising retries to the exhaustion marker
    pub fn fail_exhausted(
        &mut self,
        kind: FailureKind,
        reason: impl Into<String>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) {
        self.status = ItemStatus::Failed;
        self.error_kind = Some(kind);
        self.error_reason = Some(reason.into());
        self.retries = self.retries.max(max_retries);
        self.clear_lease(now);
    }

    /// Abandon the item terminally
    pub fn abandon(&mut self, reason: impl Into<String>, max_retries: u32, now: DateTime<Utc>) {
        self.status = ItemStatus::Abandoned;
        self.error_kind = None;
        self.error_reason = Some(reason.into());
        self.retries = self.retries.max(max_retries);
        self.clear_lease(now);
    }

    /// Administrative requeue from terminal Failed: the one explicit bypass
    /// of the retry counter
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::New;
        self.retries = 0;
        self.output = None;
        self.error_kind = None;
        self.error_reason = None;
        self.clear_lease(now);
    }

    fn clear_lease(&mut self, now: DateTime<Utc>) {
        self.locked_by = None;
        self.locked_at = None;
        self.updated_at = now;
    }
}

/// An item handed to a claimant by `claim_batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedItem {
    pub id: ItemId,
    pub reference: Option<String>,
    pub priority: i32,
    pub payload: Vec<u8>,
    pub locked_at: DateTime<Utc>,
}

impl ClaimedItem {
    pub fn from_record(record: &ItemRecord) -> Self {
        Self {
            id: record.id.clone(),
            reference: record.reference.clone(),
            priority: record.priority,
            payload: record.payload.clone(),
            locked_at: record.locked_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_sets_lease_fields_together() {
        let mut item = ItemRecord::new(QueueId::new(), ItemSubmission::new(b"x".to_vec()));
        let now = Utc::now();

        item.claim(ClaimantId::from("worker-1"), now);
        assert_eq!(item.status, ItemStatus::InProgress);
        assert!(item.locked_by.is_some());
        assert_eq!(item.locked_at, Some(now));

        item.complete(None, now);
        assert!(item.locked_by.is_none());
        assert!(item.locked_at.is_none());
        assert_eq!(item.completed_at, Some(now));
    }

    #[test]
    fn test_abandon_clears_lease_and_marks_exhausted() {
        let mut item = ItemRecord::new(QueueId::new(), ItemSubmission::new(b"x".to_vec()));
        let now = Utc::now();
        item.claim(ClaimantId::from("worker-1"), now);

        item.abandon("lease expired", 3, now);
        assert_eq!(item.status, ItemStatus::Abandoned);
        assert!(item.locked_by.is_none() && item.locked_at.is_none());
        assert_eq!(item.error_reason.as_deref(), Some("lease expired"));
        assert!(item.error_kind.is_none());
        assert_eq!(item.retries, 3);
    }

    #[test]
    fn test_reset_bypasses_retry_counter() {
        let mut item = ItemRecord::new(QueueId::new(), ItemSubmission::new(b"x".to_vec()));
        let now = Utc::now();
        item.claim(ClaimantId::from("worker-1"), now);
        item.fail_exhausted(FailureKind::Application, "boom", 2, now);
        assert_eq!(item.retries, 2);

        item.reset(now);
        assert_eq!(item.status, ItemStatus::New);
        assert_eq!(item.retries, 0);
        assert!(item.error_reason.is_none());
    }
}
