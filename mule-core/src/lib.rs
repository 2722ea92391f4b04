//! mule-core: collaborator seams for the MuleRS orchestration core.
//!
//! The claiming and scheduling crates never talk to identity, notification,
//! audit, or job-execution subsystems directly. Everything flows through the
//! narrow async traits defined here, so a deployment can plug in its own
//! implementations while tests run against the in-memory ones.

pub mod job;
pub mod memory;
pub mod service;

pub use job::{JobId, JobRecord, JobSource, JobSpec, JobState};
pub use memory::{AllowAll, DenyAll, MemoryJobs, NullAuditLog, NullNotifier, RecordingNotifier};
pub use service::{notification, AuditLog, JobService, Notifier, PermissionGate};
