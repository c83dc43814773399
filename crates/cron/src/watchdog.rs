//! Liveness check for the external periodic trigger.
//!
//! [`PulseJob`] runs from the periodic trigger and leaves a ping
//! timestamp behind. [`WatchdogJob`] runs opportunistically: while the
//! ping stays fresh it keeps a tolerance counter topped up; once the ping
//! goes stale it burns through the counter and then alerts the operators,
//! recomputing the counter from the outage length so repeated alerts
//! arrive with growing spacing.

use std::sync::Arc;

use cachetrail_core::Timestamp;
use cachetrail_notify::{Notification, Notifier};
use cachetrail_store::KeyValueStore;
use serde_json::json;
use tracing::{info, warn};

use crate::job::{CronJob, JobError};
use crate::trigger::Trigger;

/// Store key the pulse job writes and the watchdog reads.
pub const LAST_PING_KEY: &str = "cron_last_ping";
/// Store key for the watchdog's remaining-tolerance counter.
pub const TOLERANCE_KEY: &str = "cron_watchdog_tolerance";

/// Retention for both watchdog state entries.
const STATE_TTL_SECS: u64 = 86400;
/// A ping older than this counts as stale.
const FRESH_WINDOW_SECS: i64 = 3600;
/// Tolerance restored whenever a fresh ping is seen.
const MAX_TOLERANCE: i64 = 3;

pub const PULSE_PERIOD_SECS: i64 = 3600;
pub const WATCHDOG_PERIOD_SECS: i64 = 1800;

async fn get_i64(store: &dyn KeyValueStore, key: &str) -> Result<Option<i64>, JobError> {
    Ok(store.get(key).await?.and_then(|v| v.as_i64()))
}

/// Periodic job that records "the external trigger fired" once per hour.
pub struct PulseJob {
    store: Arc<dyn KeyValueStore>,
}

impl PulseJob {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl CronJob for PulseJob {
    fn name(&self) -> &str {
        "cron-pulse"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Periodic { period_secs: PULSE_PERIOD_SECS }
    }

    async fn execute(&self, now: Timestamp) -> Result<(), JobError> {
        self.store.set(LAST_PING_KEY, json!(now), STATE_TTL_SECS).await?;
        Ok(())
    }
}

/// Opportunistic job verifying the periodic trigger is actually firing.
pub struct WatchdogJob {
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    /// Public base URL, quoted in the alert's suggested crontab line.
    site_url: String,
}

impl WatchdogJob {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            site_url: site_url.into(),
        }
    }

    fn alert(&self) -> Notification {
        Notification::new(
            "Periodic cron trigger not firing",
            format!(
                "The external periodic trigger has stopped invoking the API's \
                 maintenance scheduler. Please check the host's crontab; this \
                 line should be present:\n\n\
                 */5 * * * * curl -s -X POST {}/cron/tick > /dev/null\n",
                self.site_url.trim_end_matches('/')
            ),
        )
    }
}

#[async_trait::async_trait]
impl CronJob for WatchdogJob {
    fn name(&self) -> &str {
        "cron-watchdog"
    }

    fn trigger(&self) -> Trigger {
        Trigger::Opportunistic { period_secs: WATCHDOG_PERIOD_SECS }
    }

    async fn execute(&self, now: Timestamp) -> Result<(), JobError> {
        // An absent ping is treated as a day old, so a fresh deployment
        // works through the tolerance counter instead of alerting at once.
        let last_ping = get_i64(self.store.as_ref(), LAST_PING_KEY)
            .await?
            .unwrap_or(now - 86400);

        if last_ping > now - FRESH_WINDOW_SECS {
            self.store
                .set(TOLERANCE_KEY, json!(MAX_TOLERANCE), STATE_TTL_SECS)
                .await?;
            return Ok(());
        }

        let counter = get_i64(self.store.as_ref(), TOLERANCE_KEY)
            .await?
            .unwrap_or(MAX_TOLERANCE)
            - 1;

        if counter > 0 {
            warn!(
                stale_secs = now - last_ping,
                remaining = counter,
                "periodic trigger ping is stale"
            );
            self.store
                .set(TOLERANCE_KEY, json!(counter), STATE_TTL_SECS)
                .await?;
        } else if counter == 0 {
            if let Err(e) = self.notifier.send(&self.alert()).await {
                warn!("watchdog alert delivery failed: {e}");
            }

            // Re-arm proportionally to the outage length: each subsequent
            // alert waits longer than the one before.
            let since_last = now - last_ping;
            let next_tolerance = since_last / WATCHDOG_PERIOD_SECS;
            info!(
                stale_secs = since_last,
                next_tolerance, "watchdog alert raised"
            );
            self.store
                .set(TOLERANCE_KEY, json!(next_tolerance), STATE_TTL_SECS)
                .await?;
        }

        Ok(())
    }
}
