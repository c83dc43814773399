//! Trigger classes and their next-run policies.

use std::fmt;

use cachetrail_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Interval of the external time-based trigger. Periodic due times are
/// aligned down to this boundary so independently deployed processes
/// invoked at slightly different offsets converge on the same run.
pub const CADENCE_SECS: i64 = 300;

/// The two execution paths a job can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Inline during request handling, any time at or after due.
    Opportunistic,
    /// Only from the external timer, cadence-aligned.
    Periodic,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Opportunistic => write!(f, "opportunistic"),
            TriggerKind::Periodic => write!(f, "periodic"),
        }
    }
}

/// A job's trigger class together with its rescheduling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Minimum seconds that must pass between runs.
    Opportunistic { period_secs: i64 },
    /// Seconds between runs; must be a multiple of [`CADENCE_SECS`].
    Periodic { period_secs: i64 },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Opportunistic { .. } => TriggerKind::Opportunistic,
            Trigger::Periodic { .. } => TriggerKind::Periodic,
        }
    }

    pub fn period_secs(&self) -> i64 {
        match self {
            Trigger::Opportunistic { period_secs } | Trigger::Periodic { period_secs } => {
                *period_secs
            }
        }
    }

    /// Next eligible run after executing at `now`.
    ///
    /// Opportunistic jobs become due exactly one period from now. Periodic
    /// jobs round the result down to the cadence boundary.
    pub fn next_run(&self, now: Timestamp) -> Timestamp {
        match self {
            Trigger::Opportunistic { period_secs } => now + period_secs,
            Trigger::Periodic { period_secs } => align_down(now + period_secs, CADENCE_SECS),
        }
    }
}

/// Round `t` down to the nearest multiple of `cadence`.
pub fn align_down(t: Timestamp, cadence: i64) -> Timestamp {
    t - t.rem_euclid(cadence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_down_boundaries() {
        assert_eq!(align_down(0, 300), 0);
        assert_eq!(align_down(299, 300), 0);
        assert_eq!(align_down(300, 300), 300);
        assert_eq!(align_down(4610, 300), 4500);
    }

    #[test]
    fn opportunistic_next_run_is_now_plus_period() {
        let trigger = Trigger::Opportunistic { period_secs: 300 };
        assert_eq!(trigger.next_run(1000), 1300);
        assert_eq!(trigger.next_run(1234), 1534);
    }

    #[test]
    fn periodic_next_run_is_cadence_aligned() {
        let trigger = Trigger::Periodic { period_secs: 3600 };
        for now in [0, 1, 299, 1010, 86399, 1_700_000_007] {
            let next = trigger.next_run(now);
            assert_eq!(next % CADENCE_SECS, 0, "next_run({now}) = {next}");
            assert!(next <= now + 3600);
            assert!(next > now + 3600 - CADENCE_SECS);
        }
    }

    #[test]
    fn periodic_lands_on_cadence_boundary() {
        // run at t=1010 with a 1-hour period lands on the 4500 boundary
        let trigger = Trigger::Periodic { period_secs: 3600 };
        assert_eq!(trigger.next_run(1010), 4500);
    }

    #[test]
    fn kind_and_period_accessors() {
        let opp = Trigger::Opportunistic { period_secs: 60 };
        let per = Trigger::Periodic { period_secs: 600 };
        assert_eq!(opp.kind(), TriggerKind::Opportunistic);
        assert_eq!(per.kind(), TriggerKind::Periodic);
        assert_eq!(opp.period_secs(), 60);
        assert_eq!(per.period_secs(), 600);
    }

    #[test]
    fn kind_display_matches_lock_names() {
        assert_eq!(TriggerKind::Opportunistic.to_string(), "opportunistic");
        assert_eq!(TriggerKind::Periodic.to_string(), "periodic");
    }
}
