//! Build-once validated job list.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::job::CronJob;
use crate::trigger::{Trigger, CADENCE_SECS};

/// Fatal configuration errors raised when the registry is built, never at
/// scheduling time.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate job name: {0}")]
    DuplicateName(String),

    #[error("Job '{name}' has a non-positive period ({period_secs}s)")]
    InvalidPeriod { name: String, period_secs: i64 },

    #[error(
        "Periodic job '{name}' period {period_secs}s is not a multiple of the {CADENCE_SECS}s cadence"
    )]
    MisalignedPeriod { name: String, period_secs: i64 },
}

/// The fixed list of enabled jobs, validated once per process.
/// Registration order carries no scheduling significance.
pub struct JobRegistry {
    jobs: Vec<Arc<dyn CronJob>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs.iter().map(|j| j.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl JobRegistry {
    pub fn new(jobs: Vec<Arc<dyn CronJob>>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for job in &jobs {
            let name = job.name().to_string();
            if !seen.insert(name.clone()) {
                return Err(RegistryError::DuplicateName(name));
            }
            let period_secs = job.trigger().period_secs();
            if period_secs <= 0 {
                return Err(RegistryError::InvalidPeriod { name, period_secs });
            }
            if let Trigger::Periodic { period_secs } = job.trigger() {
                if period_secs % CADENCE_SECS != 0 {
                    return Err(RegistryError::MisalignedPeriod { name, period_secs });
                }
            }
            info!(
                job = job.name(),
                trigger = %job.trigger().kind(),
                period_secs,
                "registered cron job"
            );
        }
        Ok(Self { jobs })
    }

    pub fn jobs(&self) -> &[Arc<dyn CronJob>] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
