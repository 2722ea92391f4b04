use std::sync::Arc;
use std::time::Duration;

use mule_core::{
    notification, AllowAll, AuditLog, JobId, Notifier, NullAuditLog, NullNotifier, PermissionGate,
};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::store::{ItemDisposition, ItemStore};
use crate::{
    ClaimantId, ClaimedItem, FailureKind, ItemId, ItemRecord, ItemStatus, ItemSubmission,
    QueueError, QueueId, QueueRecord, QueueResult, QueueSpec, QueueUpdate,
};

/// Configuration for the queue adapter
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Window during which a claimed item is considered actively owned
    pub visibility_timeout: Duration,

    /// Age after which an abandoned-in-flight lease is swept to Abandoned
    pub stale_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(300), // 5 minutes
            stale_after: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }
}

/// Status report submitted by the claimant holding an item's lease
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: ItemStatus,
    pub output: Option<Vec<u8>>,
    pub error_kind: Option<FailureKind>,
    pub error_reason: Option<String>,
}

impl StatusUpdate {
    pub fn done(output: Option<Vec<u8>>) -> Self {
        Self {
            status: ItemStatus::Done,
            output,
            error_kind: None,
            error_reason: None,
        }
    }

    pub fn failed(kind: Option<FailureKind>, reason: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Failed,
            output: None,
            error_kind: kind,
            error_reason: Some(reason.into()),
        }
    }

    pub fn abandoned(reason: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Abandoned,
            output: None,
            error_kind: None,
            error_reason: Some(reason.into()),
        }
    }

    /// Validate the field combination and build the store-level disposition
    fn into_disposition(self) -> QueueResult<ItemDisposition> {
        match self.status {
            ItemStatus::Done => {
                if self.error_kind.is_some() || self.error_reason.is_some() {
                    return Err(QueueError::validation(
                        "a done item cannot carry error fields",
                    ));
                }
                Ok(ItemDisposition::Done {
                    output: self.output,
                })
            }
            ItemStatus::Failed => {
                let reason = match self.error_reason {
                    Some(reason) if !reason.trim().is_empty() => reason,
                    _ => {
                        return Err(QueueError::validation(
                            "a failed item requires an error reason",
                        ))
                    }
                };
                Ok(ItemDisposition::Failed {
                    // Application is the default failure classification
                    kind: self.error_kind.unwrap_or(FailureKind::Application),
                    reason,
                })
            }
            ItemStatus::Abandoned => {
                if self.error_kind.is_some() {
                    return Err(QueueError::validation(
                        "an abandoned item cannot carry a failure kind",
                    ));
                }
                let reason = match self.error_reason {
                    Some(reason) if !reason.trim().is_empty() => reason,
                    _ => {
                        return Err(QueueError::validation(
                            "an abandoned item requires an error reason",
                        ))
                    }
                };
                Ok(ItemDisposition::Abandoned { reason })
            }
            other => Err(QueueError::validation(format!(
                "a claimant cannot move an item to {}",
                other.name()
            ))),
        }
    }
}

/// Service layer over the item store: validation, permission checks on the
/// administrative surface, audit events, and post-commit notifications.
///
/// Side effects are sequenced after the state transition commits and are
/// best-effort; a failing notifier or audit sink never rolls a transition
/// back.
pub struct QueueAdapter<S: ItemStore> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditLog>,
    permissions: Arc<dyn PermissionGate>,
    config: QueueConfig,
}

impl<S: ItemStore + 'static> QueueAdapter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            notifier: Arc::new(NullNotifier),
            audit: Arc::new(NullAuditLog),
            permissions: Arc::new(AllowAll),
            config: QueueConfig::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionGate>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the adapter configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // --- queue definitions (administrative surface) ---

    #[instrument(skip(self, spec), fields(queue = %spec.name))]
    pub async fn create_queue(&self, actor: &str, spec: QueueSpec) -> QueueResult<QueueRecord> {
        self.permit(actor, "queues", "create").await?;
        let record = self.store.create_queue(spec).await?;
        info!("Created queue {} ({})", record.name, record.id);
        self.audit("create", "queue", None, Some(json!(record.clone())))
            .await;
        Ok(record)
    }

    pub async fn get_queue(&self, id: &QueueId) -> QueueResult<QueueRecord> {
        self.store.get_queue(id).await
    }

    pub async fn list_queues(&self) -> QueueResult<Vec<QueueRecord>> {
        self.store.list_queues().await
    }

    #[instrument(skip(self, update))]
    pub async fn update_queue(
        &self,
        actor: &str,
        id: &QueueId,
        update: QueueUpdate,
    ) -> QueueResult<QueueRecord> {
        self.permit(actor, "queues", "update").await?;
        let before = self.store.get_queue(id).await?;
        let record = self.store.update_queue(id, update).await?;
        self.audit(
            "update",
            "queue",
            Some(json!(before)),
            Some(json!(record.clone())),
        )
        .await;
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn delete_queue(&self, actor: &str, id: &QueueId) -> QueueResult<()> {
        self.permit(actor, "queues", "delete").await?;
        let before = self.store.get_queue(id).await?;
        self.store.delete_queue(id).await?;
        self.audit("delete", "queue", Some(json!(before)), None).await;
        Ok(())
    }

    // --- producer path ---

    #[instrument(skip(self, submission))]
    pub async fn submit_item(
        &self,
        queue_id: &QueueId,
        submission: ItemSubmission,
    ) -> QueueResult<ItemRecord> {
        let record = self.store.push_item(queue_id, submission).await?;
        debug!("Submitted item {} to queue {}", record.id, queue_id);
        Ok(record)
    }

    pub async fn get_item(&self, id: &ItemId) -> QueueResult<ItemRecord> {
        self.store.get_item(id).await
    }

    // --- claimant path ---

    /// Claim up to `batch_size` items for `claimant`. An empty vec means no
    /// eligible work, which is a normal outcome.
    #[instrument(skip(self), fields(claimant = %claimant))]
    pub async fn claim_next(
        &self,
        queue_id: &QueueId,
        claimant: &ClaimantId,
        batch_size: usize,
    ) -> QueueResult<Vec<ClaimedItem>> {
        let claimed = self
            .store
            .claim_batch(
                queue_id,
                claimant,
                batch_size.max(1),
                self.config.visibility_timeout,
            )
            .await?;
        if !claimed.is_empty() {
            debug!("Claimed {} item(s) from queue {}", claimed.len(), queue_id);
        }
        Ok(claimed)
    }

    /// Report the outcome of a claimed item.
    ///
    /// A transition that lands on terminal Failed emits the
    /// `queue-item-failed` notification after the transition commits.
    #[instrument(skip(self, update), fields(claimant = %claimant, status = update.status.name()))]
    pub async fn update_status(
        &self,
        item_id: &ItemId,
        claimant: &ClaimantId,
        update: StatusUpdate,
    ) -> QueueResult<ItemRecord> {
        let disposition = update.into_disposition()?;
        let record = self
            .store
            .resolve_item(
                item_id,
                claimant,
                disposition,
                self.config.visibility_timeout,
            )
            .await?;

        match record.status {
            ItemStatus::Failed => {
                warn!(
                    "Item {} failed terminally after {} attempt(s)",
                    record.id, record.retries
                );
                self.notify_item_failed(&record).await;
                self.audit(
                    "status",
                    "queue-item",
                    None,
                    Some(json!({"id": record.id, "status": record.status.name()})),
                )
                .await;
            }
            ItemStatus::Done | ItemStatus::Abandoned => {
                self.audit(
                    "status",
                    "queue-item",
                    None,
                    Some(json!({"id": record.id, "status": record.status.name()})),
                )
                .await;
            }
            _ => {}
        }
        Ok(record)
    }

    // --- administrative item surface ---

    /// Reset a terminally failed item back to the pool with zero retries
    #[instrument(skip(self))]
    pub async fn requeue(&self, actor: &str, item_id: &ItemId) -> QueueResult<ItemRecord> {
        self.permit(actor, "queue-items", "requeue").await?;
        let before = self.store.get_item(item_id).await?;
        let record = self.store.requeue_item(item_id).await?;
        info!("Requeued item {}", record.id);
        self.audit(
            "requeue",
            "queue-item",
            Some(json!({"id": before.id, "status": before.status.name(), "retries": before.retries})),
            Some(json!({"id": record.id, "status": record.status.name(), "retries": record.retries})),
        )
        .await;
        Ok(record)
    }

    // --- scheduler support ---

    /// Abandon long-stale leases in one queue
    pub async fn sweep_queue(&self, queue_id: &QueueId) -> QueueResult<usize> {
        let abandoned = self
            .store
            .sweep_stale(Some(queue_id), self.config.stale_after)
            .await?;
        Ok(abandoned.len())
    }

    /// Record the job now carrying these items
    pub async fn link_items(&self, item_ids: &[ItemId], job_id: &JobId) -> QueueResult<()> {
        self.store.link_job(item_ids, job_id).await
    }

    /// Emit the exhaustion notification for a terminally failed item
    pub(crate) async fn notify_item_failed(&self, record: &ItemRecord) {
        let payload = json!({
            "item_id": record.id,
            "queue_id": record.queue_id,
            "reference": record.reference,
            "retries": record.retries,
            "reason": record.error_reason,
        });
        if let Err(e) = self
            .notifier
            .send_notification(notification::QUEUE_ITEM_FAILED, payload)
            .await
        {
            warn!("Failed to send item-failed notification: {}", e);
        }
    }

    async fn permit(&self, actor: &str, resource: &str, action: &str) -> QueueResult<()> {
        let allowed = self
            .permissions
            .check_permission(actor, resource, action)
            .await
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            Err(QueueError::Forbidden(format!(
                "{} may not {} {}",
                actor, action, resource
            )))
        }
    }

    async fn audit(
        &self,
        action: &str,
        entity: &str,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) {
        if let Err(e) = self
            .audit
            .log_event(action, entity, before, after, json!({}))
            .await
        {
            debug!("Audit sink rejected event: {}", e);
        }
    }
}

impl<S: ItemStore> Clone for QueueAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            audit: self.audit.clone(),
            permissions: self.permissions.clone(),
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use mule_core::{DenyAll, RecordingNotifier};

    async fn adapter_with_queue() -> (QueueAdapter<MemoryStore>, QueueId, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        let adapter = QueueAdapter::new(Arc::new(MemoryStore::new()))
            .with_notifier(Arc::new(notifier.clone()));
        let queue = adapter
            .create_queue("tester", QueueSpec::new("emails").with_max_retries(2))
            .await
            .unwrap();
        (adapter, queue.id, notifier)
    }

    #[tokio::test]
    async fn test_done_with_error_fields_is_rejected() {
        let (adapter, queue_id, _) = adapter_with_queue().await;
        let item = adapter
            .submit_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
            .await
            .unwrap();
        let claimant = ClaimantId::from("w1");
        adapter.claim_next(&queue_id, &claimant, 1).await.unwrap();

        let mut update = StatusUpdate::done(None);
        update.error_reason = Some("oops".to_string());
        let result = adapter.update_status(&item.id, &claimant, update).await;
        assert!(matches!(result, Err(QueueError::Validation(_))));
    }

    #[tokio::test]
    async fn test_failed_without_reason_is_rejected() {
        let (adapter, queue_id, _) = adapter_with_queue().await;
        let item = adapter
            .submit_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
            .await
            .unwrap();
        let claimant = ClaimantId::from("w1");
        adapter.claim_next(&queue_id, &claimant, 1).await.unwrap();

        let update = StatusUpdate {
            status: ItemStatus::Failed,
            output: None,
            error_kind: Some(FailureKind::Application),
            error_reason: None,
        };
        let result = adapter.update_status(&item.id, &claimant, update).await;
        assert!(matches!(result, Err(QueueError::Validation(_))));
    }

    #[tokio::test]
    async fn test_exhaustion_notifies_exactly_once() {
        let (adapter, queue_id, notifier) = adapter_with_queue().await;
        let item = adapter
            .submit_item(&queue_id, ItemSubmission::new(b"mail".to_vec()))
            .await
            .unwrap();
        let claimant = ClaimantId::from("w1");

        // First attempt: application failure requeues, no notification
        adapter.claim_next(&queue_id, &claimant, 1).await.unwrap();
        let after_first = adapter
            .update_status(
                &item.id,
                &claimant,
                StatusUpdate::failed(None, "smtp down"),
            )
            .await
            .unwrap();
        assert_eq!(after_first.status, ItemStatus::New);
        assert_eq!(after_first.retries, 1);
        assert_eq!(notifier.count_of(notification::QUEUE_ITEM_FAILED), 0);

        // Second attempt exhausts the retries
        adapter.claim_next(&queue_id, &claimant, 1).await.unwrap();
        let after_second = adapter
            .update_status(
                &item.id,
                &claimant,
                StatusUpdate::failed(None, "smtp down"),
            )
            .await
            .unwrap();
        assert_eq!(after_second.status, ItemStatus::Failed);
        assert_eq!(after_second.retries, 2);
        assert_eq!(notifier.count_of(notification::QUEUE_ITEM_FAILED), 1);
    }

    #[tokio::test]
    async fn test_business_failure_notifies() {
        let (adapter, queue_id, notifier) = adapter_with_queue().await;
        let item = adapter
            .submit_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
            .await
            .unwrap();
        let claimant = ClaimantId::from("w1");
        adapter.claim_next(&queue_id, &claimant, 1).await.unwrap();

        adapter
            .update_status(
                &item.id,
                &claimant,
                StatusUpdate::failed(Some(FailureKind::Business), "bad order data"),
            )
            .await
            .unwrap();
        assert_eq!(notifier.count_of(notification::QUEUE_ITEM_FAILED), 1);
    }

    #[tokio::test]
    async fn test_administrative_surface_requires_permission() {
        let adapter = QueueAdapter::new(Arc::new(MemoryStore::new()))
            .with_permissions(Arc::new(DenyAll));

        let result = adapter
            .create_queue("intruder", QueueSpec::new("emails"))
            .await;
        assert!(matches!(result, Err(QueueError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_requeue_round_trip() {
        let (adapter, queue_id, _) = adapter_with_queue().await;
        let item = adapter
            .submit_item(&queue_id, ItemSubmission::new(b"x".to_vec()))
            .await
            .unwrap();
        let claimant = ClaimantId::from("w1");

        adapter.claim_next(&queue_id, &claimant, 1).await.unwrap();
        adapter
            .update_status(
                &item.id,
                &claimant,
                StatusUpdate::failed(Some(FailureKind::Business), "unfixable"),
            )
            .await
            .unwrap();

        let requeued = adapter.requeue("operator", &item.id).await.unwrap();
        assert_eq!(requeued.status, ItemStatus::New);
        assert_eq!(requeued.retries, 0);
        assert!(requeued.locked_by.is_none());
    }
}
