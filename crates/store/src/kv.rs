//! TTL key-value cache trait and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cachetrail_core::{Clock, Timestamp};
use serde_json::Value;

use crate::error::StoreError;

/// A shared cache of JSON values with per-entry time-to-live.
///
/// Entries past their TTL behave exactly like absent entries. Callers that
/// can tolerate staleness should treat a read error the same as a miss.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store a value, replacing any previous entry, valid for `ttl_secs`.
    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), StoreError>;

    /// Remove a value if present.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory [`KeyValueStore`] with clock-injected expiry. Used in tests
/// and single-node development runs.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (Value, Timestamp)>>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, expires)) if *expires <= now => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), StoreError> {
        let expires = self.clock.now() + ttl_secs as i64;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
