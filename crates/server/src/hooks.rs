//! Opportunistic trigger hook on the request path.
//!
//! Scheduling is a side activity of request handling: the hook checks a
//! single atomic and, when the opportunistic class is due, runs it on a
//! background task. The request itself never waits on jobs and never
//! observes their failures.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use cachetrail_cron::TriggerKind;
use tracing::error;

use crate::state::AppState;

/// While an invocation is in flight (or after a lock failure), hold off
/// further attempts for this long.
const HOLD_SECS: i64 = 60;

/// Spawn an opportunistic scheduler run if its wake-up time has passed.
pub fn kick_opportunistic(state: Arc<AppState>) {
    let now = state.clock.now();
    let due = state.next_opportunistic.load(Ordering::Relaxed);
    if now < due {
        return;
    }
    // Claim the slot; parallel requests lose the exchange and move on.
    if state
        .next_opportunistic
        .compare_exchange(due, now + HOLD_SECS, Ordering::Relaxed, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        match state.controller.run(TriggerKind::Opportunistic).await {
            Ok(next) => {
                state.next_opportunistic.store(next, Ordering::Relaxed);
            }
            Err(e) => {
                // Keep the short hold; the next request past it retries.
                error!("opportunistic cron invocation failed: {e}");
            }
        }
    });
}

/// Axum middleware wiring [`kick_opportunistic`] to every request.
pub async fn cron_hook(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    kick_opportunistic(state);
    next.run(request).await
}
