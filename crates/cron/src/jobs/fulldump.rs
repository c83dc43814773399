//! Weekly full-dump generation.
//!
//! Writes a dump manifest next to the archive location so replication
//! consumers can bootstrap without replaying the whole changelog. Skipped
//! entirely in debug deployments (see the registry builder).

use std::path::PathBuf;

use cachetrail_core::Timestamp;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use crate::job::{CronJob, JobError};
use crate::trigger::Trigger;

pub struct FulldumpJob {
    pool: PgPool,
    dump_dir: PathBuf,
}

impl FulldumpJob {
    pub fn new(pool: PgPool, dump_dir: PathBuf) -> Self {
        Self { pool, dump_dir }
    }
}

#[async_trait::async_trait]
impl CronJob for FulldumpJob {
    fn name(&self) -> &str {
        "fulldump"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Periodic { period_secs: 7 * 86400 }
    }

    async fn execute(&self, now: Timestamp) -> Result<(), JobError> {
        let revision: i64 =
            sqlx::query_scalar("select coalesce(max(revision), 0) from changelog")
                .fetch_one(&self.pool)
                .await?;
        let cache_count: i64 = sqlx::query_scalar("select count(*) from geocaches")
            .fetch_one(&self.pool)
            .await?;

        tokio::fs::create_dir_all(&self.dump_dir).await?;
        let path = self.dump_dir.join(format!("fulldump-{now}.json"));
        let manifest = json!({
            "generated_at": now,
            "revision": revision,
            "geocache_count": cache_count,
        });
        tokio::fs::write(&path, serde_json::to_vec_pretty(&manifest).map_err(|e| {
            JobError::Other(format!("manifest serialization: {e}"))
        })?)
        .await?;

        info!(path = %path.display(), revision, "fulldump manifest written");
        Ok(())
    }
}
