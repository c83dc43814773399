//! Replication changelog maintenance.
//!
//! The writer folds pending row changes into the changelog every 10
//! minutes. The cleaner runs daily: it keeps a 10-day history of
//! timestamp → max-revision samples in the shared store, computes the
//! highest revision every replica must already have seen, and deletes
//! everything below it.

use std::collections::BTreeMap;
use std::sync::Arc;

use cachetrail_core::Timestamp;
use cachetrail_store::KeyValueStore;
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::job::{CronJob, JobError};
use crate::trigger::Trigger;

pub struct ChangelogWriterJob {
    pool: PgPool,
}

impl ChangelogWriterJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CronJob for ChangelogWriterJob {
    fn name(&self) -> &str {
        "changelog-writer"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Periodic { period_secs: 600 }
    }

    async fn execute(&self, _now: Timestamp) -> Result<(), JobError> {
        let mut tx = self.pool.begin().await?;

        let appended = sqlx::query(
            r#"
            insert into changelog (object_type, object_key, change_type, data, created_at)
            select object_type, object_key, change_type, data, created_at
            from pending_changes
            order by created_at
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("delete from pending_changes")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(appended, "changelog updated");
        Ok(())
    }
}

/// Store key holding the cleaner's timestamp → revision history.
pub const REVISION_HISTORY_KEY: &str = "changelog_revisions_daily";

/// Revisions are kept for this long before becoming eligible for deletion.
const RETENTION_SECS: i64 = 10 * 86400;

pub struct ChangelogCleanerJob {
    pool: PgPool,
    store: Arc<dyn KeyValueStore>,
}

impl ChangelogCleanerJob {
    pub fn new(pool: PgPool, store: Arc<dyn KeyValueStore>) -> Self {
        Self { pool, store }
    }
}

/// Split the sample history at the retention horizon: samples older than
/// the window raise the deletion floor (every replica has had the full
/// window to catch up past them); samples inside the window are retained.
fn revision_floor(
    history: &BTreeMap<Timestamp, i64>,
    now: Timestamp,
) -> (i64, BTreeMap<Timestamp, i64>) {
    let horizon = now - RETENTION_SECS;
    let mut floor = 1;
    let mut retained = BTreeMap::new();
    for (&at, &revision) in history {
        if at < horizon {
            floor = floor.max(revision);
        } else {
            retained.insert(at, revision);
        }
    }
    (floor, retained)
}

fn parse_history(value: serde_json::Value) -> BTreeMap<Timestamp, i64> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| Some((k.parse().ok()?, v.as_i64()?)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn history_to_value(history: &BTreeMap<Timestamp, i64>) -> serde_json::Value {
    serde_json::Value::Object(
        history
            .iter()
            .map(|(at, revision)| (at.to_string(), json!(revision)))
            .collect(),
    )
}

#[async_trait::async_trait]
impl CronJob for ChangelogCleanerJob {
    fn name(&self) -> &str {
        "changelog-cleaner"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Periodic { period_secs: 86400 }
    }

    async fn execute(&self, now: Timestamp) -> Result<(), JobError> {
        let max_revision: i64 =
            sqlx::query_scalar("select coalesce(max(revision), 0) from changelog")
                .fetch_one(&self.pool)
                .await?;

        let mut history = match self.store.get(REVISION_HISTORY_KEY).await? {
            Some(value) => parse_history(value),
            None => BTreeMap::new(),
        };
        history.insert(now, max_revision);

        let (floor, retained) = revision_floor(&history, now);

        let removed = sqlx::query("delete from changelog where revision < $1")
            .bind(floor)
            .execute(&self.pool)
            .await?
            .rows_affected();

        self.store
            .set(
                REVISION_HISTORY_KEY,
                history_to_value(&retained),
                RETENTION_SECS as u64,
            )
            .await?;

        info!(floor, removed, "changelog cleaned");
        Ok(())
    }
}
