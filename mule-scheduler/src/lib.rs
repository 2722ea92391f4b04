//! # mule-scheduler: Leader-Elected Trigger Scheduling
//!
//! **Cron and queue-polling triggers feeding job execution, with exactly one
//! active scheduler across horizontally-scaled instances**
//!
//! mule-scheduler closes the loop around [`mule_queue`]: time triggers fire
//! jobs on a cron cadence, queue triggers pull claimed item batches into
//! jobs, and the bridge folds job outcomes back onto the items.
//!
//! - **Leader-locked ticks**: every instance runs the same interval loop;
//!   a TTL set-if-absent lock elects the one that evaluates triggers
//! - **Drift-free cron**: the next fire is computed from the previous due
//!   instant, not from the (possibly late) evaluation instant
//! - **Contained failures**: one trigger's failed fire is logged and
//!   notified, leaves its schedule untouched, and never blocks the others
//! - **Shared claim primitive**: queue triggers pull through the same atomic
//!   claim the external workers use, so nothing is double-processed

pub mod bridge;
pub mod cron;
pub mod error;
pub mod lock;
pub mod scheduler;
pub mod trigger;

pub use bridge::JobBridge;
pub use cron::next_fire;
pub use error::{SchedulerError, SchedulerResult};
pub use lock::{CacheLock, LeaderLease, LeaderLock};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, TickSummary};
pub use trigger::{
    TriggerId, TriggerRecord, TriggerRegistry, TriggerSchedule, TriggerSpec, TriggerUpdate,
};

/// Prelude for the common scheduling surface
pub mod prelude {
    pub use crate::bridge::JobBridge;
    pub use crate::error::{SchedulerError, SchedulerResult};
    pub use crate::lock::{CacheLock, LeaderLease, LeaderLock};
    pub use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, TickSummary};
    pub use crate::trigger::{
        TriggerId, TriggerRecord, TriggerRegistry, TriggerSchedule, TriggerSpec, TriggerUpdate,
    };
}
