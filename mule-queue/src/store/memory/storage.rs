use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mule_core::JobId;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::store::{BoxStream, ItemDisposition, ItemStore, JobOutcome};
use crate::{
    ClaimantId, ClaimedItem, FailureKind, ItemEvent, ItemId, ItemRecord, ItemStatus,
    ItemSubmission, QueueError, QueueId, QueueRecord, QueueResult, QueueSpec, QueueUpdate,
};

/// Saturating std → chrono duration conversion
fn window(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::max_value())
}

struct StoreInner {
    queues: HashMap<QueueId, QueueRecord>,
    items: HashMap<ItemId, ItemRecord>,

    /// (queue_id, reference) -> item, maintained only for queues that
    /// enforce unique references
    references: HashMap<(QueueId, String), ItemId>,
}

/// In-memory item store for development and testing.
///
/// All state sits behind one `RwLock`: every claim and status transition
/// runs selection and mutation under a single write guard, which is what
/// makes `claim_batch` an indivisible select-and-lock.
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    events: broadcast::Sender<ItemEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                queues: HashMap::new(),
                items: HashMap::new(),
                references: HashMap::new(),
            })),
            events,
        }
    }

    /// Age an item's lease by `age` (test helper)
    pub fn backdate_lock(&self, id: &ItemId, age: Duration) -> QueueResult<()> {
        let mut inner = self.inner.write();
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))?;
        if item.status == ItemStatus::InProgress {
            item.locked_at = Some(Utc::now() - window(age));
        }
        Ok(())
    }

    /// Age an item's creation instant by `age` (test helper for FIFO ordering)
    pub fn backdate_created(&self, id: &ItemId, age: Duration) -> QueueResult<()> {
        let mut inner = self.inner.write();
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))?;
        item.created_at = item.created_at - window(age);
        Ok(())
    }

    fn emit(&self, event: ItemEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            events: self.events.clone(),
        }
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn create_queue(&self, spec: QueueSpec) -> QueueResult<QueueRecord> {
        let mut inner = self.inner.write();
        if inner.queues.values().any(|q| q.name == spec.name) {
            return Err(QueueError::DuplicateQueueName(spec.name));
        }

        let record = QueueRecord::new(spec);
        inner.queues.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_queue(&self, id: &QueueId) -> QueueResult<QueueRecord> {
        self.inner
            .read()
            .queues
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::QueueNotFound(id.to_string()))
    }

    async fn list_queues(&self) -> QueueResult<Vec<QueueRecord>> {
        let mut queues: Vec<_> = self.inner.read().queues.values().cloned().collect();
        queues.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(queues)
    }

    async fn update_queue(&self, id: &QueueId, update: QueueUpdate) -> QueueResult<QueueRecord> {
        let mut inner = self.inner.write();

        if let Some(new_name) = &update.name {
            let taken = inner
                .queues
                .values()
                .any(|q| q.name == *new_name && q.id != *id);
            if taken {
                return Err(QueueError::DuplicateQueueName(new_name.clone()));
            }
        }

        let queue = inner
            .queues
            .get_mut(id)
            .ok_or_else(|| QueueError::QueueNotFound(id.to_string()))?;

        if let Some(name) = update.name {
            queue.name = name;
        }
        if let Some(max_retries) = update.max_retries {
            queue.max_retries = max_retries;
        }
        queue.updated_at = Utc::now();
        Ok(queue.clone())
    }

    async fn delete_queue(&self, id: &QueueId) -> QueueResult<()> {
        let mut inner = self.inner.write();
        inner
            .queues
            .remove(id)
            .ok_or_else(|| QueueError::QueueNotFound(id.to_string()))?;
        inner.items.retain(|_, item| item.queue_id != *id);
        inner.references.retain(|(queue_id, _), _| queue_id != id);
        Ok(())
    }

    async fn push_item(
        &self,
        queue_id: &QueueId,
        submission: ItemSubmission,
    ) -> QueueResult<ItemRecord> {
        let mut inner = self.inner.write();
        let queue = inner
            .queues
            .get(queue_id)
            .ok_or_else(|| QueueError::QueueNotFound(queue_id.to_string()))?;
        let enforce = queue.enforce_unique_reference;

        if enforce {
            if let Some(reference) = &submission.reference {
                let key = (queue_id.clone(), reference.clone());
                if inner.references.contains_key(&key) {
                    return Err(QueueError::DuplicateReference {
                        queue: queue_id.to_string(),
                        reference: reference.clone(),
                    });
                }
            }
        }

        let record = ItemRecord::new(queue_id.clone(), submission);
        if enforce {
            if let Some(reference) = &record.reference {
                inner
                    .references
                    .insert((queue_id.clone(), reference.clone()), record.id.clone());
            }
        }
        inner.items.insert(record.id.clone(), record.clone());
        drop(inner);

        self.emit(ItemEvent::Created {
            item_id: record.id.clone(),
            queue_id: queue_id.clone(),
            at: record.created_at,
        });
        Ok(record)
    }

    async fn get_item(&self, id: &ItemId) -> QueueResult<ItemRecord> {
        self.inner
            .read()
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))
    }

    async fn list_items(
        &self,
        queue_id: &QueueId,
        status: Option<ItemStatus>,
    ) -> QueueResult<Vec<ItemRecord>> {
        let inner = self.inner.read();
        if !inner.queues.contains_key(queue_id) {
            return Err(QueueError::QueueNotFound(queue_id.to_string()));
        }
        let mut items: Vec<_> = inner
            .items
            .values()
            .filter(|item| item.queue_id == *queue_id)
            .filter(|item| status.map_or(true, |s| item.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    async fn claim_batch(
        &self,
        queue_id: &QueueId,
        claimant: &ClaimantId,
        batch_size: usize,
        visibility: Duration,
    ) -> QueueResult<Vec<ClaimedItem>> {
        let now = Utc::now();
        let visibility = window(visibility);

        // Selection and locking under one write guard: the selection IS the
        // conditional update.
        let mut inner = self.inner.write();
        if !inner.queues.contains_key(queue_id) {
            return Err(QueueError::QueueNotFound(queue_id.to_string()));
        }

        let mut eligible: Vec<(Reverse<i32>, chrono::DateTime<Utc>, ItemId)> = inner
            .items
            .values()
            .filter(|item| item.queue_id == *queue_id && item.claimable(visibility, now))
            .map(|item| (Reverse(item.priority), item.created_at, item.id.clone()))
            .collect();
        eligible.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        eligible.truncate(batch_size);

        let mut claimed = Vec::with_capacity(eligible.len());
        for (_, _, id) in eligible {
            if let Some(item) = inner.items.get_mut(&id) {
                item.claim(claimant.clone(), now);
                claimed.push(ClaimedItem::from_record(item));
            }
        }
        drop(inner);

        for item in &claimed {
            self.emit(ItemEvent::Claimed {
                item_id: item.id.clone(),
                claimant: claimant.clone(),
                at: now,
            });
        }
        Ok(claimed)
    }

    async fn resolve_item(
        &self,
        id: &ItemId,
        claimant: &ClaimantId,
        disposition: ItemDisposition,
        visibility: Duration,
    ) -> QueueResult<ItemRecord> {
        let now = Utc::now();
        let visibility = window(visibility);

        let mut inner = self.inner.write();
        let max_retries = {
            let item = inner
                .items
                .get(id)
                .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))?;
            let queue = inner
                .queues
                .get(&item.queue_id)
                .ok_or_else(|| QueueError::QueueNotFound(item.queue_id.to_string()))?;
            queue.max_retries
        };

        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))?;

        // The lease check doubles as the terminal-state check: terminal and
        // New items carry no lease, and an item reassigned after lease expiry
        // carries someone else's.
        let owns_lease = item.status == ItemStatus::InProgress
            && item.locked_by.as_ref() == Some(claimant)
            && !item.lease_older_than(visibility, now);
        if !owns_lease {
            return Err(QueueError::LeaseConflict);
        }

        let event = match disposition {
            ItemDisposition::Done { output } => {
                item.complete(output, now);
                ItemEvent::Completed {
                    item_id: id.clone(),
                    at: now,
                }
            }
            ItemDisposition::Failed { kind, reason } => match kind {
                FailureKind::Business => {
                    item.fail_exhausted(kind, reason.clone(), max_retries, now);
                    ItemEvent::Exhausted {
                        item_id: id.clone(),
                        reason,
                        at: now,
                    }
                }
                FailureKind::Application => {
                    if item.retries + 1 < max_retries {
                        item.retry(now);
                        ItemEvent::Retried {
                            item_id: id.clone(),
                            retries: item.retries,
                            at: now,
                        }
                    } else {
                        item.retries += 1;
                        item.fail_exhausted(kind, reason.clone(), max_retries, now);
                        ItemEvent::Exhausted {
                            item_id: id.clone(),
                            reason,
                            at: now,
                        }
                    }
                }
            },
            ItemDisposition::Abandoned { reason } => {
                item.abandon(reason.clone(), max_retries, now);
                ItemEvent::Abandoned {
                    item_id: id.clone(),
                    reason,
                    at: now,
                }
            }
        };

        let record = item.clone();
        drop(inner);

        self.emit(event);
        Ok(record)
    }

    async fn requeue_item(&self, id: &ItemId) -> QueueResult<ItemRecord> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let item = inner
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))?;

        if item.status != ItemStatus::Failed {
            return Err(QueueError::validation(format!(
                "only failed items can be requeued, item is {}",
                item.status.name()
            )));
        }

        item.reset(now);
        let record = item.clone();
        drop(inner);

        self.emit(ItemEvent::Requeued {
            item_id: id.clone(),
            at: now,
        });
        Ok(record)
    }

    async fn sweep_stale(
        &self,
        queue_id: Option<&QueueId>,
        stale_after: Duration,
    ) -> QueueResult<Vec<ItemRecord>> {
        let now = Utc::now();
        let stale_after = window(stale_after);

        let mut inner = self.inner.write();
        let stale: Vec<ItemId> = inner
            .items
            .values()
            .filter(|item| queue_id.map_or(true, |q| item.queue_id == *q))
            .filter(|item| item.lease_older_than(stale_after, now))
            .map(|item| item.id.clone())
            .collect();

        let mut abandoned = Vec::with_capacity(stale.len());
        for id in stale {
            let max_retries = inner
                .items
                .get(&id)
                .and_then(|item| inner.queues.get(&item.queue_id))
                .map(|q| q.max_retries)
                .unwrap_or(0);
            if let Some(item) = inner.items.get_mut(&id) {
                item.abandon("lease expired", max_retries, now);
                abandoned.push(item.clone());
            }
        }
        drop(inner);

        for item in &abandoned {
            self.emit(ItemEvent::Abandoned {
                item_id: item.id.clone(),
                reason: "lease expired".to_string(),
                at: now,
            });
        }
        Ok(abandoned)
    }

    async fn link_job(&self, item_ids: &[ItemId], job_id: &JobId) -> QueueResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        for id in item_ids {
            let item = inner
                .items
                .get_mut(id)
                .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))?;
            item.job_id = Some(job_id.clone());
            item.updated_at = now;
        }
        Ok(())
    }

    async fn finalize_for_job(
        &self,
        job_id: &JobId,
        outcome: JobOutcome,
    ) -> QueueResult<Vec<ItemRecord>> {
        let now = Utc::now();
        let mut inner = self.inner.write();

        let linked: Vec<ItemId> = inner
            .items
            .values()
            .filter(|item| item.job_id.as_ref() == Some(job_id) && !item.status.is_terminal())
            .map(|item| item.id.clone())
            .collect();

        let mut updated = Vec::with_capacity(linked.len());
        let mut events = Vec::with_capacity(linked.len());
        for id in linked {
            let max_retries = inner
                .items
                .get(&id)
                .and_then(|item| inner.queues.get(&item.queue_id))
                .map(|q| q.max_retries)
                .unwrap_or(0);
            if let Some(item) = inner.items.get_mut(&id) {
                match &outcome {
                    JobOutcome::Completed => {
                        item.complete(None, now);
                        events.push(ItemEvent::Completed {
                            item_id: id.clone(),
                            at: now,
                        });
                    }
                    JobOutcome::Failed { error } => {
                        let reason = item
                            .error_reason
                            .clone()
                            .or_else(|| error.clone())
                            .unwrap_or_else(|| "job failed".to_string());
                        item.fail_exhausted(FailureKind::Application, reason.clone(), max_retries, now);
                        events.push(ItemEvent::Exhausted {
                            item_id: id.clone(),
                            reason,
                            at: now,
                        });
                    }
                }
                updated.push(item.clone());
            }
        }
        drop(inner);

        for event in events {
            self.emit(event);
        }
        Ok(updated)
    }

    fn event_stream(&self) -> BoxStream<ItemEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};
        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}
