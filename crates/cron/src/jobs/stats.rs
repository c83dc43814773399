//! Folds the fast request-log staging table into permanent hourly stats.

use cachetrail_core::Timestamp;
use sqlx::PgPool;
use tracing::debug;

use crate::job::{CronJob, JobError};
use crate::trigger::Trigger;

pub struct StatsRollupJob {
    pool: PgPool,
}

impl StatsRollupJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CronJob for StatsRollupJob {
    fn name(&self) -> &str {
        "stats-rollup"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Opportunistic { period_secs: 60 }
    }

    async fn execute(&self, _now: Timestamp) -> Result<(), JobError> {
        // Rollup and truncation happen in one transaction so a crash
        // between them cannot drop rows.
        let mut tx = self.pool.begin().await?;

        let rolled = sqlx::query(
            r#"
            insert into api_stats_hourly
                (consumer_key, user_id, period_start, service_name,
                 total_calls, http_calls, total_runtime, http_runtime)
            select
                consumer_key,
                user_id,
                date_trunc('hour', called_at),
                service_name,
                count(*),
                count(*) filter (where calltype = 'http'),
                coalesce(sum(runtime), 0),
                coalesce(sum(runtime) filter (where calltype = 'http'), 0)
            from api_request_log
            group by consumer_key, user_id, date_trunc('hour', called_at), service_name
            on conflict (consumer_key, user_id, period_start, service_name) do update set
                total_calls   = api_stats_hourly.total_calls + excluded.total_calls,
                http_calls    = api_stats_hourly.http_calls + excluded.http_calls,
                total_runtime = api_stats_hourly.total_runtime + excluded.total_runtime,
                http_runtime  = api_stats_hourly.http_runtime + excluded.http_runtime
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("delete from api_request_log")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(rolled, "hourly stats rollup done");
        Ok(())
    }
}
