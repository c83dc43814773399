//! The deployed job roster and its construction.

mod cache_gc;
mod changelog;
mod fulldump;
mod stats;
mod tokens;

use std::sync::Arc;

use cachetrail_core::config::CronConfig;
use cachetrail_notify::Notifier;
use cachetrail_store::{KeyValueStore, PgStore};
use sqlx::PgPool;

pub use cache_gc::CacheGcJob;
pub use changelog::{ChangelogCleanerJob, ChangelogWriterJob};
pub use fulldump::FulldumpJob;
pub use stats::StatsRollupJob;
pub use tokens::TokenCleanupJob;

use crate::job::CronJob;
use crate::registry::{JobRegistry, RegistryError};
use crate::watchdog::{PulseJob, WatchdogJob};

/// Collaborators the job roster needs.
pub struct JobDeps {
    pub pool: PgPool,
    pub cache: PgStore,
    pub store: Arc<dyn KeyValueStore>,
    pub notifier: Arc<dyn Notifier>,
    pub cron: CronConfig,
    pub site_url: String,
}

/// Build the registry of all enabled jobs. Called once per process;
/// composition is a deployment-time decision (debug deployments skip the
/// fulldump job).
pub fn default_registry(deps: &JobDeps) -> Result<JobRegistry, RegistryError> {
    let mut jobs: Vec<Arc<dyn CronJob>> = vec![
        Arc::new(TokenCleanupJob::new(deps.pool.clone())),
        Arc::new(StatsRollupJob::new(deps.pool.clone())),
        Arc::new(CacheGcJob::new(deps.cache.clone())),
        Arc::new(PulseJob::new(deps.store.clone())),
        Arc::new(WatchdogJob::new(
            deps.store.clone(),
            deps.notifier.clone(),
            deps.site_url.clone(),
        )),
        Arc::new(ChangelogWriterJob::new(deps.pool.clone())),
        Arc::new(ChangelogCleanerJob::new(
            deps.pool.clone(),
            deps.store.clone(),
        )),
    ];
    if !deps.cron.debug_mode {
        jobs.push(Arc::new(FulldumpJob::new(
            deps.pool.clone(),
            deps.cron.dump_dir.clone(),
        )));
    }
    JobRegistry::new(jobs)
}
