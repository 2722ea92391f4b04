use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by the item store and the queue adapter.
///
/// An empty claim is not represented here: `claim_batch` returning no items
/// is a normal outcome, not an error.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Queue item not found: {0}")]
    ItemNotFound(String),

    #[error("Queue name already in use: {0}")]
    DuplicateQueueName(String),

    #[error("Reference '{reference}' already exists in queue {queue}")]
    DuplicateReference { queue: String, reference: String },

    #[error("Lease conflict: item is not held by this claimant or the lease has lapsed")]
    LeaseConflict,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
