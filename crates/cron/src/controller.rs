//! The orchestration loop: lock, load, run due jobs, reschedule, persist.

use std::sync::Arc;
use std::time::Instant;

use cachetrail_core::{Clock, Timestamp};
use cachetrail_store::{KeyValueStore, LockService, StoreError};
use tracing::{debug, error, info, warn};

use crate::registry::JobRegistry;
use crate::schedule::Schedule;
use crate::trigger::TriggerKind;

/// Cap on the reported wake-up time: the caller never waits longer than
/// this even when nothing is scheduled sooner.
const MAX_WAIT_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("Lock error: {0}")]
    Lock(#[from] StoreError),
}

/// Drives the job registry against the persisted schedule.
///
/// One invocation per trigger class runs at a time; the per-class lock
/// serializes concurrent callers (simultaneous HTTP requests, or the
/// external timer firing while requests are in flight). Opportunistic and
/// periodic invocations never contend with each other.
pub struct CronController {
    registry: JobRegistry,
    store: Arc<dyn KeyValueStore>,
    locks: Arc<dyn LockService>,
    clock: Arc<dyn Clock>,
}

impl CronController {
    pub fn new(
        registry: JobRegistry,
        store: Arc<dyn KeyValueStore>,
        locks: Arc<dyn LockService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            locks,
            clock,
        }
    }

    /// Execute all due jobs of `kind` now and return the Unix timestamp of
    /// the nearest scheduled event.
    pub async fn run(&self, kind: TriggerKind) -> Result<Timestamp, CronError> {
        self.run_at(kind, self.clock.now()).await
    }

    /// Like [`run`](Self::run) with an explicit `now`, so tests and
    /// tooling control the clock.
    ///
    /// Job failures are isolated: a failing job is logged and keeps its
    /// due entry (it stays due for the next matching invocation) and the
    /// invocation continues. Only lock acquisition can fail this method.
    pub async fn run_at(&self, kind: TriggerKind, now: Timestamp) -> Result<Timestamp, CronError> {
        let guard = self.locks.acquire(&format!("cronjobs-{kind}")).await?;

        let mut schedule = Schedule::load(self.store.as_ref()).await;
        debug!(trigger = %kind, now, entries = schedule.iter().count(), "cron invocation start");

        for job in self.registry.jobs() {
            let name = job.name();
            let entry = schedule.get(name);
            let due = entry.map_or(true, |t| t <= now);
            if !due {
                continue;
            }

            if job.trigger().kind() != kind {
                // Due, but owned by the other trigger class: the entry is
                // left alone (absent already means due immediately), so
                // the next matching invocation picks it up.
                continue;
            }

            let started = Instant::now();
            match job.execute(now).await {
                Ok(()) => {
                    let next = job.next_run(now, entry.unwrap_or(now));
                    schedule.set(name, next);
                    info!(
                        job = name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        next_run = next,
                        "cron job completed"
                    );
                }
                Err(e) => {
                    // Entry stays as it was, so the job is retried on the
                    // next matching invocation.
                    error!(
                        job = name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "cron job failed: {e}"
                    );
                }
            }
        }

        let nearest = schedule.nearest(now + MAX_WAIT_SECS);

        if let Err(e) = schedule.save(self.store.as_ref()).await {
            // Jobs already ran; losing the bump costs at most one extra
            // spurious run per job.
            warn!("failed to persist schedule: {e}");
        }

        if let Err(e) = guard.release().await {
            warn!(trigger = %kind, "failed to release cron lock: {e}");
        }

        Ok(nearest)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use cachetrail_core::ManualClock;
    use cachetrail_store::{MemoryLocks, MemoryStore};
    use serde_json::Value;

    use super::*;
    use crate::job::{CronJob, JobError};
    use crate::schedule::SCHEDULE_KEY;
    use crate::trigger::Trigger;

    /// Mock cron job counting executions.
    struct MockJob {
        name: String,
        trigger: Trigger,
        executions: Arc<AtomicUsize>,
        fail: bool,
        delay: Duration,
    }

    impl MockJob {
        fn new(name: &str, trigger: Trigger) -> Self {
            Self {
                name: name.to_string(),
                trigger,
                executions: Arc::new(AtomicUsize::new(0)),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn failing(name: &str, trigger: Trigger) -> Self {
            Self {
                fail: true,
                ..Self::new(name, trigger)
            }
        }

        fn slow(name: &str, trigger: Trigger, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(name, trigger)
            }
        }

        fn counter(&self) -> Arc<AtomicUsize> {
            self.executions.clone()
        }
    }

    #[async_trait::async_trait]
    impl CronJob for MockJob {
        fn name(&self) -> &str {
            &self.name
        }

        fn trigger(&self) -> Trigger {
            self.trigger
        }

        async fn execute(&self, _now: Timestamp) -> Result<(), JobError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.executions.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(JobError::Other("mock failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        controller: CronController,
    }

    fn fixture(jobs: Vec<Arc<dyn CronJob>>, now: Timestamp) -> Fixture {
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let controller = CronController::new(
            JobRegistry::new(jobs).unwrap(),
            store.clone(),
            Arc::new(MemoryLocks::new()),
            clock.clone(),
        );
        Fixture {
            clock,
            store,
            controller,
        }
    }

    async fn persisted_entry(store: &MemoryStore, name: &str) -> Option<Timestamp> {
        let value = store.get(SCHEDULE_KEY).await.unwrap()?;
        match &value[name] {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn opportunistic_run_executes_and_reschedules() {
        // Two jobs, one per class, empty schedule, run(opportunistic)
        // at t=1000.
        let job_a = Arc::new(MockJob::new(
            "job-a",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let job_b = Arc::new(MockJob::new("job-b", Trigger::Periodic { period_secs: 3600 }));
        let (count_a, count_b) = (job_a.counter(), job_b.counter());

        let f = fixture(vec![job_a, job_b], 1000);
        let nearest = f
            .controller
            .run_at(TriggerKind::Opportunistic, 1000)
            .await
            .unwrap();

        assert_eq!(count_a.load(Ordering::Relaxed), 1);
        assert_eq!(count_b.load(Ordering::Relaxed), 0);
        assert_eq!(persisted_entry(&f.store, "job-a").await, Some(1300));
        // job-b stays absent: still due immediately for the periodic run.
        assert_eq!(persisted_entry(&f.store, "job-b").await, None);
        assert_eq!(nearest, 1300);
    }

    #[tokio::test]
    async fn periodic_follow_up_run() {
        // Same setup, opportunistic run at t=1000 then periodic at t=1010.
        let job_a = Arc::new(MockJob::new(
            "job-a",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let job_b = Arc::new(MockJob::new("job-b", Trigger::Periodic { period_secs: 3600 }));
        let (count_a, count_b) = (job_a.counter(), job_b.counter());

        let f = fixture(vec![job_a, job_b], 1000);
        f.controller
            .run_at(TriggerKind::Opportunistic, 1000)
            .await
            .unwrap();
        let nearest = f
            .controller
            .run_at(TriggerKind::Periodic, 1010)
            .await
            .unwrap();

        assert_eq!(count_a.load(Ordering::Relaxed), 1, "job-a not due yet");
        assert_eq!(count_b.load(Ordering::Relaxed), 1);
        assert_eq!(
            persisted_entry(&f.store, "job-b").await,
            Some(4500),
            "align_down(1010 + 3600, 300)"
        );
        // job-a's 1300 entry is nearer than 4500.
        assert_eq!(nearest, 1300);
    }

    #[tokio::test]
    async fn other_class_entries_never_advance() {
        let periodic = Arc::new(MockJob::new("p", Trigger::Periodic { period_secs: 600 }));
        let count = periodic.counter();

        let f = fixture(vec![periodic], 1000);

        // Pre-seed a passed due time, then run the other class twice.
        let mut schedule = Schedule::new();
        schedule.set("p", 500);
        schedule.save(f.store.as_ref()).await.unwrap();

        f.controller
            .run_at(TriggerKind::Opportunistic, 1000)
            .await
            .unwrap();
        f.controller
            .run_at(TriggerKind::Opportunistic, 1200)
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 0);
        let entry = persisted_entry(&f.store, "p").await.unwrap();
        assert_eq!(entry, 500, "existing due time kept, never advanced");
    }

    #[tokio::test]
    async fn not_due_jobs_are_untouched() {
        let job = Arc::new(MockJob::new(
            "a",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let count = job.counter();

        let f = fixture(vec![job], 1000);
        let mut schedule = Schedule::new();
        schedule.set("a", 2000);
        schedule.save(f.store.as_ref()).await.unwrap();

        let nearest = f
            .controller
            .run_at(TriggerKind::Opportunistic, 1000)
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert_eq!(persisted_entry(&f.store, "a").await, Some(2000));
        assert_eq!(nearest, 2000);
    }

    #[tokio::test]
    async fn failed_job_stays_due_and_does_not_abort_the_run() {
        let bad = Arc::new(MockJob::failing(
            "bad",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let good = Arc::new(MockJob::new(
            "good",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let (bad_count, good_count) = (bad.counter(), good.counter());

        let f = fixture(vec![bad, good], 1000);
        let result = f.controller.run_at(TriggerKind::Opportunistic, 1000).await;

        assert!(result.is_ok(), "job failure must not fail the invocation");
        assert_eq!(bad_count.load(Ordering::Relaxed), 1);
        assert_eq!(good_count.load(Ordering::Relaxed), 1, "later jobs still run");
        assert_eq!(
            persisted_entry(&f.store, "bad").await,
            None,
            "failed job's entry is not advanced"
        );
        assert_eq!(persisted_entry(&f.store, "good").await, Some(1300));

        // Still due: the next invocation retries it.
        f.controller
            .run_at(TriggerKind::Opportunistic, 1001)
            .await
            .unwrap();
        assert_eq!(bad_count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn schedule_roundtrips_between_invocations() {
        let job = Arc::new(MockJob::new(
            "a",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let count = job.counter();

        let f = fixture(vec![job], 1000);
        f.controller
            .run_at(TriggerKind::Opportunistic, 1000)
            .await
            .unwrap();
        let after_first = persisted_entry(&f.store, "a").await;

        // Second invocation before the due time: nothing changes.
        let nearest = f
            .controller
            .run_at(TriggerKind::Opportunistic, 1100)
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(persisted_entry(&f.store, "a").await, after_first);
        assert_eq!(nearest, 1300);
    }

    #[tokio::test]
    async fn concurrent_same_class_invocations_execute_once() {
        let job = Arc::new(MockJob::slow(
            "slow",
            Trigger::Opportunistic { period_secs: 300 },
            Duration::from_millis(50),
        ));
        let count = job.counter();

        let f = fixture(vec![job], 1000);
        let controller = Arc::new(f.controller);

        let (c1, c2) = (controller.clone(), controller.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { c1.run_at(TriggerKind::Opportunistic, 1000).await }),
            tokio::spawn(async move { c2.run_at(TriggerKind::Opportunistic, 1000).await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        // The lock serializes the two invocations; the second reloads the
        // schedule and finds the job no longer due.
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_registry_returns_capped_wake_up() {
        let f = fixture(vec![], 1000);
        let nearest = f
            .controller
            .run_at(TriggerKind::Periodic, 1000)
            .await
            .unwrap();
        assert_eq!(nearest, 1000 + 3600);
    }

    #[tokio::test]
    async fn run_uses_injected_clock() {
        let job = Arc::new(MockJob::new(
            "a",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let f = fixture(vec![job], 5000);
        let nearest = f.controller.run(TriggerKind::Opportunistic).await.unwrap();
        assert_eq!(nearest, 5300);
        assert_eq!(f.clock.now(), 5000);
    }

    // ── Store unavailability ──────────────────────────────────

    /// Store that fails every operation.
    struct BrokenStore;

    #[async_trait::async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Lock("store down".to_string()))
        }
        async fn set(&self, _key: &str, _value: Value, _ttl: u64) -> Result<(), StoreError> {
            Err(StoreError::Lock("store down".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Lock("store down".to_string()))
        }
    }

    #[tokio::test]
    async fn store_unavailability_degrades_to_everything_due() {
        let job = Arc::new(MockJob::new(
            "a",
            Trigger::Opportunistic { period_secs: 300 },
        ));
        let count = job.counter();

        let clock = Arc::new(ManualClock::new(1000));
        let controller = CronController::new(
            JobRegistry::new(vec![job]).unwrap(),
            Arc::new(BrokenStore),
            Arc::new(MemoryLocks::new()),
            clock,
        );

        let nearest = controller
            .run_at(TriggerKind::Opportunistic, 1000)
            .await
            .unwrap();

        // A failed read means an empty schedule, which makes the job due.
        // The failed save is logged and the computed wake-up still returned.
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(nearest, 1300);
    }
}
