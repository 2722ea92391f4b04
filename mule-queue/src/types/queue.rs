use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::QueueId;

/// Queue definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: QueueId,

    /// Unique across all queues
    pub name: String,

    /// Application failures re-enter the pool while `retries < max_retries`
    pub max_retries: u32,

    /// Reject duplicate item references within this queue. Fixed at creation.
    pub enforce_unique_reference: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueRecord {
    pub fn new(spec: QueueSpec) -> Self {
        let now = Utc::now();
        Self {
            id: QueueId::new(),
            name: spec.name,
            max_retries: spec.max_retries,
            enforce_unique_reference: spec.enforce_unique_reference,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Data for creating a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,
    pub max_retries: u32,
    pub enforce_unique_reference: bool,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_retries: 3,
            enforce_unique_reference: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_unique_reference(mut self) -> Self {
        self.enforce_unique_reference = true;
        self
    }
}

/// Mutable queue fields. `enforce_unique_reference` is deliberately absent;
/// the policy cannot change once items may rely on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueUpdate {
    pub name: Option<String>,
    pub max_retries: Option<u32>,
}
