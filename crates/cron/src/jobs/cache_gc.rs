//! Reaps expired rows from the shared cache table once per hour.

use cachetrail_core::Timestamp;
use cachetrail_store::PgStore;
use tracing::info;

use crate::job::{CronJob, JobError};
use crate::trigger::Trigger;

pub struct CacheGcJob {
    cache: PgStore,
}

impl CacheGcJob {
    pub fn new(cache: PgStore) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl CronJob for CacheGcJob {
    fn name(&self) -> &str {
        "cache-gc"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Periodic { period_secs: 3600 }
    }

    async fn execute(&self, _now: Timestamp) -> Result<(), JobError> {
        let removed = self.cache.purge_expired().await?;
        info!(removed, "cache gc done");
        Ok(())
    }
}
