//! Cooperative maintenance-job scheduler.
//!
//! Jobs declare one of two trigger classes: *opportunistic* jobs may run
//! inline during request handling any time at or after their due time,
//! while *periodic* jobs run only when the external timer fires and keep
//! their due times aligned to the timer's cadence. [`CronController::run`]
//! executes every due job of the requested class under a per-class
//! advisory lock, persists the updated schedule, and reports when the
//! caller should check back.

pub mod controller;
pub mod job;
pub mod jobs;
pub mod registry;
pub mod schedule;
pub mod trigger;
pub mod watchdog;

pub use controller::{CronController, CronError};
pub use job::{CronJob, JobError};
pub use registry::{JobRegistry, RegistryError};
pub use schedule::Schedule;
pub use trigger::{Trigger, TriggerKind, CADENCE_SECS};
