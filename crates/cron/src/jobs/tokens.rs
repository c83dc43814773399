//! Expired auth token and nonce cleanup. Required for the request-signing
//! layer to stay safe, so it runs opportunistically every 5 minutes.

use cachetrail_core::Timestamp;
use sqlx::PgPool;
use tracing::debug;

use crate::job::{CronJob, JobError};
use crate::trigger::Trigger;

pub struct TokenCleanupJob {
    pool: PgPool,
}

impl TokenCleanupJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CronJob for TokenCleanupJob {
    fn name(&self) -> &str {
        "token-cleanup"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Opportunistic { period_secs: 300 }
    }

    async fn execute(&self, _now: Timestamp) -> Result<(), JobError> {
        let tokens = sqlx::query("delete from auth_tokens where expires < now()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        let nonces =
            sqlx::query("delete from auth_nonces where created < now() - interval '10 minutes'")
                .execute(&self.pool)
                .await?
                .rows_affected();
        debug!(tokens, nonces, "auth cleanup done");
        Ok(())
    }
}
