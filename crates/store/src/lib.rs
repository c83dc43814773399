//! Shared persistence collaborators: a TTL key-value cache and a named,
//! process-safe advisory lock service. Both come as Postgres-backed
//! implementations for deployment and in-memory implementations for tests
//! and single-node development.

pub mod error;
pub mod kv;
pub mod lock;
pub mod postgres;

pub use error::StoreError;
pub use kv::{KeyValueStore, MemoryStore};
pub use lock::{LockGuard, LockService, MemoryLocks};
pub use postgres::{PgLocks, PgStore};
