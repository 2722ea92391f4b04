//! In-memory collaborator implementations for development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::job::{JobId, JobRecord, JobSpec, JobState};
use crate::service::{AuditLog, JobService, Notifier, PermissionGate};

/// Permission gate that grants everything
#[derive(Debug, Clone, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionGate for AllowAll {
    async fn check_permission(&self, _: &str, _: &str, _: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Permission gate that denies everything
#[derive(Debug, Clone, Default)]
pub struct DenyAll;

#[async_trait]
impl PermissionGate for DenyAll {
    async fn check_permission(&self, _: &str, _: &str, _: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Notifier that drops everything
#[derive(Debug, Clone, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_notification(&self, _: &str, _: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Notifier that records every notification for later assertions
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<(String, Value)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications sent so far, in order
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.read().clone()
    }

    /// Count of notifications of the given kind
    pub fn count_of(&self, kind: &str) -> usize {
        self.sent.read().iter().filter(|(k, _)| k == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification(&self, kind: &str, payload: Value) -> anyhow::Result<()> {
        self.sent.write().push((kind.to_string(), payload));
        Ok(())
    }
}

/// Audit log that swallows everything
#[derive(Debug, Clone, Default)]
pub struct NullAuditLog;

#[async_trait]
impl AuditLog for NullAuditLog {
    async fn log_event(
        &self,
        _: &str,
        _: &str,
        _: Option<Value>,
        _: Option<Value>,
        _: Value,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory job-execution stand-in.
///
/// Jobs are stored as records and never actually executed; tests drive their
/// state transitions by hand. When constructed with a process list, creating
/// a job against an unknown `process_ref` fails the way a dangling process
/// reference would in production.
#[derive(Clone)]
pub struct MemoryJobs {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    processes: Option<Arc<RwLock<HashSet<String>>>>,
}

impl MemoryJobs {
    /// Create a job service that accepts any process reference
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            processes: None,
        }
    }

    /// Create a job service that only accepts the given process references
    pub fn with_processes<I, S>(processes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            processes: Some(Arc::new(RwLock::new(
                processes.into_iter().map(Into::into).collect(),
            ))),
        }
    }

    /// Register a process reference after construction
    pub fn register_process(&self, process_ref: impl Into<String>) {
        if let Some(processes) = &self.processes {
            processes.write().insert(process_ref.into());
        }
    }

    /// Drive a job to a terminal state (test helper)
    pub fn set_state(&self, id: &JobId, state: JobState, error: Option<String>) -> Option<JobRecord> {
        let mut jobs = self.jobs.write();
        let record = jobs.get_mut(id)?;
        match state {
            JobState::Completed => record.complete(),
            JobState::Failed => record.fail(error.unwrap_or_else(|| "job failed".to_string())),
            other => {
                record.state = other;
                record.updated_at = chrono::Utc::now();
            }
        }
        Some(record.clone())
    }

    pub fn list(&self) -> Vec<JobRecord> {
        self.jobs.read().values().cloned().collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }
}

impl Default for MemoryJobs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobService for MemoryJobs {
    async fn create_job(&self, spec: JobSpec) -> anyhow::Result<JobId> {
        if let Some(processes) = &self.processes {
            if !processes.read().contains(&spec.process_ref) {
                bail!("unknown process reference: {}", spec.process_ref);
            }
        }

        let id = JobId::new();
        let record = JobRecord::new(id.clone(), spec);
        self.jobs.write().insert(id.clone(), record);
        Ok(id)
    }

    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<JobRecord>> {
        Ok(self.jobs.read().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_fetch_job() {
        let jobs = MemoryJobs::new();
        let id = jobs.create_job(JobSpec::manual("invoices")).await.unwrap();

        let record = jobs.get_job(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.id, id);
    }

    #[tokio::test]
    async fn test_unknown_process_is_rejected() {
        let jobs = MemoryJobs::with_processes(["invoices"]);

        let result = jobs.create_job(JobSpec::manual("payroll")).await;
        assert!(result.is_err());

        jobs.register_process("payroll");
        assert!(jobs.create_job(JobSpec::manual("payroll")).await.is_ok());
    }

    #[tokio::test]
    async fn test_recording_notifier_counts_by_kind() {
        let notifier = RecordingNotifier::new();
        notifier
            .send_notification("queue-item-failed", serde_json::json!({"item": "a"}))
            .await
            .unwrap();
        notifier
            .send_notification("trigger-failed", serde_json::json!({"trigger": "t"}))
            .await
            .unwrap();

        assert_eq!(notifier.count_of("queue-item-failed"), 1);
        assert_eq!(notifier.sent().len(), 2);
    }
}
