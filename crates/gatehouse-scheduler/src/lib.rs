//! Trigger admission and scheduling for Gatehouse.
//!
//! A trigger request is first run through an admission chain
//! ([`service::SchedulingCheckerService`]); manual triggers go through
//! [`manual::ManualTriggerService`]. An accepted build cause is queued
//! in the [`queue::ScheduleQueue`] and later promoted into a persisted run,
//! taking the pipeline lock ([`lock::PipelineLockService`]) on the way.

pub mod checkers;
pub mod config;
pub mod disk;
pub mod lock;
pub mod manual;
pub mod queue;
pub mod service;
pub mod triggers;

pub use config::SchedulerConfig;
pub use disk::{DiskSpaceProbe, DiskSpaceSample, StatvfsReader};
pub use lock::{LockStatusChange, PipelineLockListener, PipelineLockService};
pub use manual::ManualTriggerService;
pub use queue::ScheduleQueue;
pub use service::{DiskCheckers, SchedulingCheckerService};
pub use triggers::{TriggerClaim, TriggerMonitor};
