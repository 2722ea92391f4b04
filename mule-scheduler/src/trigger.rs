use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mule_queue::QueueId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cron;
use crate::error::{SchedulerError, SchedulerResult};

/// Unique identifier for a trigger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub String);

impl TriggerId {
    /// Generate a new unique trigger ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TriggerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TriggerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Schedule source of a trigger.
///
/// The two kinds carry disjoint configuration by construction; replacing the
/// schedule discards the other kind's fields instead of leaving orphaned
/// columns behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TriggerSchedule {
    /// Fire on a cron cadence
    Time {
        cron_expression: String,
        /// IANA timezone the expression is evaluated in
        timezone: String,
    },

    /// Poll a queue for claimable items
    Queue {
        queue_id: QueueId,
        /// Items claimed per poll
        batch_size: usize,
        polling_interval: Duration,
    },
}

impl TriggerSchedule {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Time { .. } => "time",
            Self::Queue { .. } => "queue",
        }
    }

    fn validate(&self) -> SchedulerResult<()> {
        match self {
            Self::Time {
                cron_expression,
                timezone,
            } => {
                cron::parse_schedule(cron_expression)?;
                cron::parse_timezone(timezone)?;
                Ok(())
            }
            Self::Queue { batch_size, .. } => {
                if *batch_size == 0 {
                    return Err(SchedulerError::Validation(
                        "queue trigger batch_size must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Trigger definition and fire-tracking state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: TriggerId,
    pub name: String,
    pub enabled: bool,

    /// Process the created jobs should run
    pub process_ref: String,

    /// Worker the created jobs are pinned to, if any
    pub worker_ref: Option<String>,

    pub schedule: TriggerSchedule,

    /// Next due instant, persisted explicitly by the scheduler after each
    /// evaluation
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub name: String,
    pub process_ref: String,
    pub worker_ref: Option<String>,
    pub schedule: TriggerSchedule,
    pub enabled: bool,
}

impl TriggerSpec {
    pub fn time(
        name: impl Into<String>,
        process_ref: impl Into<String>,
        cron_expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            process_ref: process_ref.into(),
            worker_ref: None,
            schedule: TriggerSchedule::Time {
                cron_expression: cron_expression.into(),
                timezone: timezone.into(),
            },
            enabled: true,
        }
    }

    pub fn queue(
        name: impl Into<String>,
        process_ref: impl Into<String>,
        queue_id: QueueId,
        batch_size: usize,
        polling_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            process_ref: process_ref.into(),
            worker_ref: None,
            schedule: TriggerSchedule::Queue {
                queue_id,
                batch_size,
                polling_interval,
            },
            enabled: true,
        }
    }

    pub fn with_worker(mut self, worker_ref: impl Into<String>) -> Self {
        self.worker_ref = Some(worker_ref.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Mutable trigger fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerUpdate {
    pub name: Option<String>,
    pub process_ref: Option<String>,
    pub worker_ref: Option<String>,

    /// Replacing the schedule clears `next_fire_at`/`last_fired_at` so the
    /// new schedule anchors fresh
    pub schedule: Option<TriggerSchedule>,
}

/// In-memory trigger CRUD.
///
/// Clones share the same underlying map, so the scheduler and the
/// administrative surface always see one set of triggers.
#[derive(Clone, Default)]
pub struct TriggerRegistry {
    triggers: Arc<RwLock<HashMap<TriggerId, TriggerRecord>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, spec: TriggerSpec) -> SchedulerResult<TriggerRecord> {
        spec.schedule.validate()?;

        let now = Utc::now();
        let record = TriggerRecord {
            id: TriggerId::new(),
            name: spec.name,
            enabled: spec.enabled,
            process_ref: spec.process_ref,
            worker_ref: spec.worker_ref,
            schedule: spec.schedule,
            next_fire_at: None,
            last_fired_at: None,
            created_at: now,
            updated_at: now,
        };
        self.triggers
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &TriggerId) -> SchedulerResult<TriggerRecord> {
        self.triggers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::TriggerNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<TriggerRecord> {
        let mut triggers: Vec<_> = self.triggers.read().values().cloned().collect();
        triggers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        triggers
    }

    pub fn update(&self, id: &TriggerId, update: TriggerUpdate) -> SchedulerResult<TriggerRecord> {
        if let Some(schedule) = &update.schedule {
            schedule.validate()?;
        }

        let mut triggers = self.triggers.write();
        let record = triggers
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TriggerNotFound(id.to_string()))?;

        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(process_ref) = update.process_ref {
            record.process_ref = process_ref;
        }
        if let Some(worker_ref) = update.worker_ref {
            record.worker_ref = Some(worker_ref);
        }
        if let Some(schedule) = update.schedule {
            record.schedule = schedule;
            record.next_fire_at = None;
            record.last_fired_at = None;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub fn delete(&self, id: &TriggerId) -> SchedulerResult<()> {
        self.triggers
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::TriggerNotFound(id.to_string()))
    }

    /// Enable or disable a trigger. Enabling clears `next_fire_at` so the
    /// schedule re-anchors at the present instead of replaying fires missed
    /// while disabled.
    pub fn set_enabled(&self, id: &TriggerId, enabled: bool) -> SchedulerResult<TriggerRecord> {
        let mut triggers = self.triggers.write();
        let record = triggers
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TriggerNotFound(id.to_string()))?;

        if enabled && !record.enabled {
            record.next_fire_at = None;
        }
        record.enabled = enabled;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Persist a computed next-fire instant without marking a fire
    pub fn set_next_fire(
        &self,
        id: &TriggerId,
        next_fire_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut triggers = self.triggers.write();
        let record = triggers
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TriggerNotFound(id.to_string()))?;
        record.next_fire_at = next_fire_at;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Record a fire and the next due instant
    pub fn mark_fired(
        &self,
        id: &TriggerId,
        fired_at: DateTime<Utc>,
        next_fire_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut triggers = self.triggers.write();
        let record = triggers
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TriggerNotFound(id.to_string()))?;
        record.last_fired_at = Some(fired_at);
        record.next_fire_at = next_fire_at;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Snapshot of the enabled triggers for one tick's evaluation
    pub fn snapshot_enabled(&self) -> Vec<TriggerRecord> {
        let mut triggers: Vec<_> = self
            .triggers
            .read()
            .values()
            .filter(|t| t.enabled)
            .cloned()
            .collect();
        triggers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_validates_schedule() {
        let registry = TriggerRegistry::new();

        let bad_cron = registry.create(TriggerSpec::time("t", "proc", "nope", "UTC"));
        assert!(matches!(bad_cron, Err(SchedulerError::InvalidCron { .. })));

        let bad_tz = registry.create(TriggerSpec::time("t", "proc", "* * * * *", "Nowhere"));
        assert!(matches!(bad_tz, Err(SchedulerError::UnknownTimezone(_))));

        let zero_batch = registry.create(TriggerSpec::queue(
            "t",
            "proc",
            QueueId::new(),
            0,
            Duration::from_secs(30),
        ));
        assert!(matches!(zero_batch, Err(SchedulerError::Validation(_))));
    }

    #[test]
    fn test_schedule_change_clears_fire_tracking() {
        let registry = TriggerRegistry::new();
        let record = registry
            .create(TriggerSpec::time("t", "proc", "* * * * *", "UTC"))
            .unwrap();
        registry
            .mark_fired(&record.id, Utc::now(), Some(Utc::now()))
            .unwrap();

        let updated = registry
            .update(
                &record.id,
                TriggerUpdate {
                    schedule: Some(TriggerSchedule::Queue {
                        queue_id: QueueId::new(),
                        batch_size: 5,
                        polling_interval: Duration::from_secs(10),
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.schedule.kind(), "queue");
        assert!(updated.next_fire_at.is_none());
        assert!(updated.last_fired_at.is_none());
    }

    #[test]
    fn test_snapshot_only_sees_enabled_triggers() {
        let registry = TriggerRegistry::new();
        let active = registry
            .create(TriggerSpec::time("active", "proc", "* * * * *", "UTC"))
            .unwrap();
        registry
            .create(TriggerSpec::time("dormant", "proc", "* * * * *", "UTC").disabled())
            .unwrap();

        let snapshot = registry.snapshot_enabled();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, active.id);
    }

    #[test]
    fn test_reenable_clears_stale_next_fire() {
        let registry = TriggerRegistry::new();
        let record = registry
            .create(TriggerSpec::time("t", "proc", "* * * * *", "UTC"))
            .unwrap();
        registry
            .set_next_fire(&record.id, Some(Utc::now() - chrono::Duration::hours(6)))
            .unwrap();

        registry.set_enabled(&record.id, false).unwrap();
        let reenabled = registry.set_enabled(&record.id, true).unwrap();
        assert!(reenabled.next_fire_at.is_none());
    }
}
