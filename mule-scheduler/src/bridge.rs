use std::sync::Arc;

use mule_core::{notification, JobRecord, JobState, Notifier, NullNotifier};
use mule_queue::store::{ItemStore, JobOutcome};
use mule_queue::{ItemRecord, ItemStatus};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{SchedulerError, SchedulerResult};

/// Folds a job's terminal outcome back onto its linked queue items.
///
/// The single path by which execution results close the loop on queue state:
/// used for scheduler-created jobs and for jobs that workers report through
/// the execution layer instead of the queue-item API.
pub struct JobBridge<S: ItemStore> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: ItemStore + 'static> JobBridge<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            notifier: Arc::new(NullNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Apply a terminal job's outcome to every linked, not-yet-terminal item:
    /// completed → Done, failed → terminal Failed carrying the job's error
    /// where the item has none of its own. Emits the exhaustion notification
    /// per newly failed item, after the transition commits.
    pub async fn on_job_terminal(&self, job: &JobRecord) -> SchedulerResult<Vec<ItemRecord>> {
        let outcome = match job.state {
            JobState::Completed => JobOutcome::Completed,
            JobState::Failed => JobOutcome::Failed {
                error: job.error_message.clone(),
            },
            other => {
                return Err(SchedulerError::Validation(format!(
                    "job {} is not terminal (state {})",
                    job.id,
                    other.name()
                )))
            }
        };

        let updated = self.store.finalize_for_job(&job.id, outcome).await?;
        if !updated.is_empty() {
            info!(
                "Job {} closed {} linked item(s) as {}",
                job.id,
                updated.len(),
                job.state.name()
            );
        }

        for item in updated.iter().filter(|i| i.status == ItemStatus::Failed) {
            let payload = json!({
                "item_id": item.id,
                "queue_id": item.queue_id,
                "job_id": job.id,
                "retries": item.retries,
                "reason": item.error_reason,
            });
            if let Err(e) = self
                .notifier
                .send_notification(notification::QUEUE_ITEM_FAILED, payload)
                .await
            {
                warn!("Failed to send item-failed notification: {}", e);
            }
        }

        Ok(updated)
    }
}

impl<S: ItemStore> Clone for JobBridge<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
