use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job owned by the execution subsystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new unique job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// How a job came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobSource {
    /// Started by an operator through the API
    Manual,

    /// Started by the trigger scheduler
    Trigger,
}

/// Job lifecycle as observed by the orchestration core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not yet picked up by a worker
    Pending,

    /// Currently executing
    Running,

    /// Finished successfully
    Completed,

    /// Finished with an error
    Failed,
}

impl JobState {
    /// Check if the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Input for `JobService::create_job`.
///
/// Foreign identifiers (trigger, queue items) cross this seam as plain
/// strings so the execution subsystem stays decoupled from the queue crate's
/// id types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Reference to the process definition the job should run
    pub process_ref: String,

    pub source: JobSource,

    /// Trigger that fired this job, if any
    pub trigger_id: Option<String>,

    /// Queue items carried by this job, in claim order
    pub queue_item_ids: Vec<String>,

    /// Specific worker the job is pinned to, if any
    pub worker_ref: Option<String>,
}

impl JobSpec {
    pub fn manual(process_ref: impl Into<String>) -> Self {
        Self {
            process_ref: process_ref.into(),
            source: JobSource::Manual,
            trigger_id: None,
            queue_item_ids: Vec::new(),
            worker_ref: None,
        }
    }

    pub fn triggered(process_ref: impl Into<String>, trigger_id: impl Into<String>) -> Self {
        Self {
            process_ref: process_ref.into(),
            source: JobSource::Trigger,
            trigger_id: Some(trigger_id.into()),
            queue_item_ids: Vec::new(),
            worker_ref: None,
        }
    }

    pub fn with_queue_items(mut self, item_ids: Vec<String>) -> Self {
        self.queue_item_ids = item_ids;
        self
    }

    pub fn with_worker(mut self, worker_ref: impl Into<String>) -> Self {
        self.worker_ref = Some(worker_ref.into());
        self
    }
}

/// Job record as the execution subsystem reports it back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub source: JobSource,
    pub trigger_id: Option<String>,
    pub queue_item_ids: Vec<String>,
    pub state: JobState,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId, spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            source: spec.source,
            trigger_id: spec.trigger_id,
            queue_item_ids: spec.queue_item_ids,
            state: JobState::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the job completed
    pub fn complete(&mut self) {
        self.state = JobState::Completed;
        self.updated_at = Utc::now();
    }

    /// Mark the job failed with an error message
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }
}
