use mule_queue::QueueError;
use thiserror::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors surfaced by the trigger scheduler.
///
/// `Transient` marks a fire that should be retried on the next tick; it is
/// contained within one trigger's evaluation and never crashes the loop.
#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transient scheduling failure: {0}")]
    Transient(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
