//! Named advisory locks with blocking acquire and guaranteed release.
//!
//! The scheduler serializes invocations of the same trigger class through
//! these locks. A guard releases on [`LockGuard::release`], and releasing
//! is also guaranteed when the guard is dropped on an error path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::StoreError;

/// Acquires named locks. Acquire blocks until the lock is free; there is
/// deliberately no timeout (a stuck holder blocks followers of the same
/// name indefinitely).
#[async_trait::async_trait]
pub trait LockService: Send + Sync {
    async fn acquire(&self, name: &str) -> Result<Box<dyn LockGuard>, StoreError>;
}

/// Held lock. Dropping the guard releases the lock; `release` does the
/// same but surfaces errors from the lock backend.
#[async_trait::async_trait]
pub trait LockGuard: Send {
    async fn release(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-process [`LockService`]. Process-safe backends (Postgres advisory
/// locks) are in [`crate::postgres`]; this one covers tests and
/// single-node development.
#[derive(Default)]
pub struct MemoryLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryGuard {
    _held: OwnedMutexGuard<()>,
}

#[async_trait::async_trait]
impl LockGuard for MemoryGuard {}

#[async_trait::async_trait]
impl LockService for MemoryLocks {
    async fn acquire(&self, name: &str) -> Result<Box<dyn LockGuard>, StoreError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let held = lock.lock_owned().await;
        Ok(Box::new(MemoryGuard { _held: held }))
    }
}
