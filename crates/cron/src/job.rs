use cachetrail_core::Timestamp;
use cachetrail_store::StoreError;

use crate::trigger::Trigger;

/// Error type for cron job execution.
///
/// A failing job never aborts the scheduler invocation: the controller
/// logs the error and leaves the job due for the next matching run.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// A unit of maintenance work the scheduler can execute.
///
/// Implementations perform arbitrary external work (database statements,
/// file generation); the controller treats that work as opaque. Execution
/// must be idempotent enough to tolerate running slightly early or, after
/// a crash, one extra time.
#[async_trait::async_trait]
pub trait CronJob: Send + Sync {
    /// Globally unique, stable name. Used as the schedule persistence key,
    /// so renaming a job abandons its old schedule entry.
    fn name(&self) -> &str;

    /// Trigger class and period. Immutable for the job's lifetime.
    fn trigger(&self) -> Trigger;

    /// Perform the work. `now` is injected by the controller.
    async fn execute(&self, now: Timestamp) -> Result<(), JobError>;

    /// Next eligible run, called directly after the job executed at `now`.
    /// `previous_due` is the due time the run satisfied (`now` when the
    /// job had no schedule entry).
    fn next_run(&self, now: Timestamp, previous_due: Timestamp) -> Timestamp {
        let _ = previous_due;
        self.trigger().next_run(now)
    }
}
