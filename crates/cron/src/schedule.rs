//! The persisted job-name → next-due-time map.

use std::collections::BTreeMap;

use cachetrail_core::Timestamp;
use cachetrail_store::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Store key holding the full schedule map.
pub const SCHEDULE_KEY: &str = "cron_schedule";

/// Retention for the persisted schedule. Long enough to survive any
/// expected gap between invocations; if it lapses anyway, every job is
/// simply due again.
pub const SCHEDULE_TTL_SECS: u64 = 30 * 86400;

/// Mapping from job name to next eligible run. An absent entry means the
/// job is due immediately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    entries: BTreeMap<String, Timestamp>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Timestamp> {
        self.entries.get(name).copied()
    }

    pub fn set(&mut self, name: &str, due: Timestamp) {
        self.entries.insert(name.to_string(), due);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Timestamp)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest due time across all entries, capped at `cap` so the caller
    /// never waits indefinitely on an empty or far-future schedule.
    pub fn nearest(&self, cap: Timestamp) -> Timestamp {
        self.entries.values().copied().fold(cap, Timestamp::min)
    }

    /// Load from the store. Unavailability or a malformed payload degrades
    /// to an empty schedule, which makes every job due.
    pub async fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(SCHEDULE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!("persisted schedule is malformed, treating as empty: {e}");
                    Self::new()
                }
            },
            Ok(None) => Self::new(),
            Err(e) => {
                warn!("failed to load schedule, treating as empty: {e}");
                Self::new()
            }
        }
    }

    /// Persist the full map with its retention window.
    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        let value = serde_json::to_value(self)?;
        store.set(SCHEDULE_KEY, value, SCHEDULE_TTL_SECS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachetrail_core::ManualClock;
    use cachetrail_store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn nearest_caps_empty_schedule() {
        let schedule = Schedule::new();
        assert_eq!(schedule.nearest(4600), 4600);
    }

    #[test]
    fn nearest_picks_minimum_entry() {
        let mut schedule = Schedule::new();
        schedule.set("a", 1300);
        schedule.set("b", 4500);
        assert_eq!(schedule.nearest(4600), 1300);
    }

    #[test]
    fn nearest_keeps_cap_when_entries_are_later() {
        let mut schedule = Schedule::new();
        schedule.set("a", 9999);
        assert_eq!(schedule.nearest(4600), 4600);
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(1000)));
        let mut schedule = Schedule::new();
        schedule.set("token-cleanup", 1300);
        schedule.set("cache-gc", 4500);
        schedule.save(&store).await.unwrap();

        let loaded = Schedule::load(&store).await;
        assert_eq!(loaded, schedule);
    }

    #[tokio::test]
    async fn load_missing_is_empty() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(1000)));
        assert!(Schedule::load(&store).await.is_empty());
    }

    #[tokio::test]
    async fn load_expired_is_empty() {
        let clock = Arc::new(ManualClock::new(1000));
        let store = MemoryStore::new(clock.clone());
        let mut schedule = Schedule::new();
        schedule.set("a", 1300);
        schedule.save(&store).await.unwrap();

        clock.advance(SCHEDULE_TTL_SECS as i64 + 1);
        assert!(Schedule::load(&store).await.is_empty());
    }

    #[tokio::test]
    async fn load_malformed_is_empty() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(1000)));
        store
            .set(SCHEDULE_KEY, serde_json::json!("not a map"), 60)
            .await
            .unwrap();
        assert!(Schedule::load(&store).await.is_empty());
    }
}
