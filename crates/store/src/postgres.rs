//! Postgres-backed cache and advisory locks via `sqlx`.

use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

use cachetrail_core::config::PostgresConfig;

use crate::error::StoreError;
use crate::kv::KeyValueStore;
use crate::lock::{LockGuard, LockService};

/// Open a connection pool from config.
pub async fn connect(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;
    Ok(pool)
}

// ── Key-value cache ───────────────────────────────────────────

/// [`KeyValueStore`] backed by the `api_cache` table. Values are stored as
/// serialized JSON text; expiry is enforced on read and reaped by the
/// cache-gc cron job.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            create table if not exists api_cache (
                key     text primary key,
                value   text not null,
                expires timestamptz not null
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete expired rows. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("delete from api_cache where expires < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = sqlx::query_scalar(
            "select value from api_cache where key = $1 and expires > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), StoreError> {
        let text = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            insert into api_cache (key, value, expires)
            values ($1, $2, now() + make_interval(secs => $3))
            on conflict (key) do update
                set value = excluded.value, expires = excluded.expires
            "#,
        )
        .bind(key)
        .bind(text)
        .bind(ttl_secs as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("delete from api_cache where key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ── Advisory locks ────────────────────────────────────────────

/// [`LockService`] on Postgres session advisory locks, safe across
/// independent OS processes sharing the database.
#[derive(Clone)]
pub struct PgLocks {
    pool: PgPool,
}

impl PgLocks {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Guard holding the session connection that owns the advisory lock.
///
/// `release` unlocks cleanly and returns the connection to the pool. If
/// the guard is dropped while still holding the lock, the connection is
/// detached from the pool and closed, which ends the session and releases
/// the lock with it.
struct PgLockGuard {
    conn: Option<PoolConnection<Postgres>>,
    name: String,
}

#[async_trait::async_trait]
impl LockService for PgLocks {
    async fn acquire(&self, name: &str) -> Result<Box<dyn LockGuard>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        // Blocks in the database until the lock is free.
        sqlx::query("select pg_advisory_lock(hashtext($1))")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        Ok(Box::new(PgLockGuard {
            conn: Some(conn),
            name: name.to_string(),
        }))
    }
}

#[async_trait::async_trait]
impl LockGuard for PgLockGuard {
    async fn release(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("select pg_advisory_unlock(hashtext($1))")
                .bind(&self.name)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl Drop for PgLockGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Closing the session is the only way to guarantee the lock
            // falls without an async context.
            tracing::warn!(lock = %self.name, "lock guard dropped while held; closing session");
            drop(conn.detach());
        }
    }
}
