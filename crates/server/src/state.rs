use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use cachetrail_core::Clock;
use cachetrail_cron::CronController;
use cachetrail_store::KeyValueStore;

/// Shared application state.
pub struct AppState {
    pub controller: Arc<CronController>,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    /// Next time the opportunistic trigger class is worth running.
    /// Requests check this before spawning a scheduler invocation so the
    /// hot path stays a single atomic load.
    pub next_opportunistic: AtomicI64,
}

impl AppState {
    pub fn new(
        controller: Arc<CronController>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            controller,
            store,
            clock,
            next_opportunistic: AtomicI64::new(0),
        }
    }
}
