use async_trait::async_trait;
use serde_json::Value;

use crate::job::{JobId, JobRecord, JobSpec};

/// Well-known notification kinds emitted by the orchestration core
pub mod notification {
    /// A queue item reached terminal FAILED with its retries exhausted
    pub const QUEUE_ITEM_FAILED: &str = "queue-item-failed";

    /// A trigger fire could not create its job
    pub const TRIGGER_FAILED: &str = "trigger-failed";
}

/// Permission checks against the external identity/authorization subsystem.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Returns whether `actor` may perform `action` on `resource`.
    async fn check_permission(
        &self,
        actor: &str,
        resource: &str,
        action: &str,
    ) -> anyhow::Result<bool>;
}

/// Fire-and-forget notification delivery.
///
/// Callers sequence notifications after their state transition commits and
/// swallow delivery failures; a broken notifier must never roll back queue
/// state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(&self, kind: &str, payload: Value) -> anyhow::Result<()>;
}

/// Best-effort audit trail. Failures are logged and swallowed by callers.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn log_event(
        &self,
        action: &str,
        entity: &str,
        before: Option<Value>,
        after: Option<Value>,
        metadata: Value,
    ) -> anyhow::Result<()>;
}

/// The job-execution subsystem, as consumed by the scheduler and the bridge.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Create a job for execution. Fails when the referenced process does not
    /// exist (a dangling `process_ref` on a trigger).
    async fn create_job(&self, spec: JobSpec) -> anyhow::Result<JobId>;

    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<JobRecord>>;
}
