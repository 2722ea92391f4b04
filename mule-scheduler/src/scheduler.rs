use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mule_core::{notification, JobService, JobSpec, Notifier, NullNotifier};
use mule_queue::store::ItemStore;
use mule_queue::{ClaimantId, ItemId, QueueAdapter, QueueId};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cron;
use crate::error::{SchedulerError, SchedulerResult};
use crate::lock::{LeaderLease, LeaderLock};
use crate::trigger::{TriggerRecord, TriggerRegistry, TriggerSchedule};

/// Configuration for a scheduler instance
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between ticks
    pub tick_interval: Duration,

    /// Leader lock key shared by all instances scheduling the same triggers
    pub lock_key: String,

    /// Leader lock TTL; must exceed the worst-case tick duration
    pub lock_ttl: Duration,

    /// Identity of this instance, used as lock holder and claimant
    pub instance_id: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            lock_key: "mule/scheduler/leader".to_string(),
            lock_ttl: Duration::from_secs(30),
            instance_id: Uuid::new_v4().to_string(),
        }
    }
}

/// What one leader-held tick accomplished
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub jobs_created: usize,
    pub items_claimed: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct FireResult {
    job_created: bool,
    items_claimed: usize,
}

impl FireResult {
    fn idle() -> Self {
        Self::default()
    }

    fn fired() -> Self {
        Self {
            job_created: true,
            items_claimed: 0,
        }
    }
}

/// The trigger tick loop.
///
/// Every instance runs the same loop; the leader lock decides which one
/// evaluates triggers in a given interval. Each trigger's evaluation commits
/// independently, so one trigger's failure never blocks the others and an
/// interrupted tick leaves no inconsistent multi-trigger state.
pub struct Scheduler<S: ItemStore> {
    triggers: TriggerRegistry,
    queue: QueueAdapter<S>,
    jobs: Arc<dyn JobService>,
    notifier: Arc<dyn Notifier>,
    lock: Arc<dyn LeaderLock>,
    config: SchedulerConfig,
}

impl<S: ItemStore + 'static> Scheduler<S> {
    pub fn new(
        triggers: TriggerRegistry,
        queue: QueueAdapter<S>,
        jobs: Arc<dyn JobService>,
        lock: Arc<dyn LeaderLock>,
    ) -> Self {
        Self {
            triggers,
            queue,
            jobs,
            notifier: Arc::new(NullNotifier),
            lock,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Claimant identity used for queue-trigger claims
    fn claimant(&self) -> ClaimantId {
        ClaimantId::from(format!("scheduler/{}", self.config.instance_id))
    }

    /// Run one tick: contend for the leader lock and, on winning, evaluate
    /// every enabled trigger. Returns `None` when another instance holds the
    /// lock.
    pub async fn tick(&self) -> Option<TickSummary> {
        let lease = self
            .lock
            .try_acquire(
                &self.config.lock_key,
                &self.config.instance_id,
                self.config.lock_ttl,
            )
            .await?;

        Some(self.evaluate_tick(&lease).await)
    }

    async fn evaluate_tick(&self, lease: &LeaderLease) -> TickSummary {
        let now = Utc::now();
        let mut summary = TickSummary::default();

        debug!(
            "Instance {} leads tick (lease until {})",
            lease.holder, lease.expires_at
        );

        for trigger in self.triggers.snapshot_enabled() {
            let result = match &trigger.schedule {
                TriggerSchedule::Time {
                    cron_expression,
                    timezone,
                } => {
                    self.fire_time_trigger(&trigger, cron_expression, timezone, now)
                        .await
                }
                TriggerSchedule::Queue {
                    queue_id,
                    batch_size,
                    polling_interval,
                } => {
                    self.poll_queue_trigger(&trigger, queue_id, *batch_size, *polling_interval, now)
                        .await
                }
            };

            match result {
                Ok(fire) => {
                    if fire.job_created {
                        summary.jobs_created += 1;
                    }
                    summary.items_claimed += fire.items_claimed;
                }
                Err(e) => {
                    summary.failures += 1;
                    warn!("Trigger {} evaluation failed: {}", trigger.name, e);
                    self.notify_trigger_failed(&trigger, &e).await;
                }
            }
        }

        summary
    }

    async fn fire_time_trigger(
        &self,
        trigger: &TriggerRecord,
        cron_expression: &str,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<FireResult> {
        let due = match trigger.next_fire_at {
            None => {
                // First sighting: anchor the schedule and wait for a later tick
                let next = cron::next_fire(cron_expression, timezone, now)?;
                self.triggers.set_next_fire(&trigger.id, Some(next))?;
                debug!("Trigger {} anchored, first fire at {}", trigger.name, next);
                return Ok(FireResult::idle());
            }
            Some(due) if now < due => return Ok(FireResult::idle()),
            Some(due) => due,
        };

        let mut spec = JobSpec::triggered(trigger.process_ref.clone(), trigger.id.to_string());
        if let Some(worker) = &trigger.worker_ref {
            spec = spec.with_worker(worker.clone());
        }

        // On failure, next_fire_at stays put so the same fire retries next tick
        let job_id = self
            .jobs
            .create_job(spec)
            .await
            .map_err(|e| SchedulerError::Transient(e.to_string()))?;

        // Recompute from the due instant, not from now: late ticks must not
        // drift the schedule
        let next = cron::next_fire(cron_expression, timezone, due)?;
        self.triggers.mark_fired(&trigger.id, now, Some(next))?;

        info!(
            "Trigger {} fired job {} (next fire {})",
            trigger.name, job_id, next
        );
        Ok(FireResult::fired())
    }

    async fn poll_queue_trigger(
        &self,
        trigger: &TriggerRecord,
        queue_id: &QueueId,
        batch_size: usize,
        polling_interval: Duration,
        now: DateTime<Utc>,
    ) -> SchedulerResult<FireResult> {
        if let Some(due) = trigger.next_fire_at {
            if now < due {
                return Ok(FireResult::idle());
            }
        }

        let next_poll = now
            + chrono::Duration::from_std(polling_interval)
                .unwrap_or_else(|_| chrono::Duration::max_value());

        let swept = self.queue.sweep_queue(queue_id).await?;
        if swept > 0 {
            info!("Abandoned {} stale lease(s) in queue {}", swept, queue_id);
        }

        let claimed = self
            .queue
            .claim_next(queue_id, &self.claimant(), batch_size)
            .await?;
        if claimed.is_empty() {
            // Nothing to do is not an error; just schedule the next poll
            self.triggers.set_next_fire(&trigger.id, Some(next_poll))?;
            return Ok(FireResult::idle());
        }

        let item_ids: Vec<ItemId> = claimed.iter().map(|item| item.id.clone()).collect();
        let mut spec = JobSpec::triggered(trigger.process_ref.clone(), trigger.id.to_string())
            .with_queue_items(item_ids.iter().map(ToString::to_string).collect());
        if let Some(worker) = &trigger.worker_ref {
            spec = spec.with_worker(worker.clone());
        }

        let job_id = self
            .jobs
            .create_job(spec)
            .await
            .map_err(|e| SchedulerError::Transient(e.to_string()))?;
        self.queue.link_items(&item_ids, &job_id).await?;
        self.triggers
            .mark_fired(&trigger.id, now, Some(next_poll))?;

        info!(
            "Trigger {} claimed {} item(s) into job {}",
            trigger.name,
            item_ids.len(),
            job_id
        );
        Ok(FireResult {
            job_created: true,
            items_claimed: item_ids.len(),
        })
    }

    async fn notify_trigger_failed(&self, trigger: &TriggerRecord, error: &SchedulerError) {
        let payload = json!({
            "trigger_id": trigger.id,
            "trigger": trigger.name,
            "error": error.to_string(),
        });
        if let Err(e) = self
            .notifier
            .send_notification(notification::TRIGGER_FAILED, payload)
            .await
        {
            warn!("Failed to send trigger-failure notification: {}", e);
        }
    }

    /// Spawn the tick loop. Shutting down cancels the pending sleep; an
    /// in-flight tick finishes before the task exits.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            info!(
                "Scheduler instance {} started (tick every {:?})",
                self.config.instance_id, self.config.tick_interval
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Scheduler shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.tick().await {
                            Some(summary) if summary.jobs_created > 0 || summary.failures > 0 => {
                                debug!(
                                    "Tick done: {} job(s), {} item(s), {} failure(s)",
                                    summary.jobs_created, summary.items_claimed, summary.failures
                                );
                            }
                            Some(_) => {}
                            None => debug!("Leader lock held elsewhere, skipping tick"),
                        }
                    }
                }
            }

            info!("Scheduler instance stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            join_handle,
        }
    }
}

/// Handle for managing a running scheduler instance
pub struct SchedulerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Gracefully shut the scheduler down
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.await;
    }
}
