//! Cron and health endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use cachetrail_cron::{Schedule, TriggerKind};
use serde::Serialize;

use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub jobs: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.controller.registry().len(),
    })
}

// ── Cron ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TickResponse {
    /// Unix timestamp of the nearest scheduled event across both classes.
    pub next_due: i64,
    pub opportunistic_next: i64,
    pub periodic_next: i64,
}

/// External 5-minute trigger entry point. Runs the opportunistic class
/// first (it is additionally eligible on every timer firing), then the
/// periodic class.
pub async fn cron_tick(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TickResponse>, (StatusCode, String)> {
    let opportunistic_next = state
        .controller
        .run(TriggerKind::Opportunistic)
        .await
        .map_err(internal_error)?;
    let periodic_next = state
        .controller
        .run(TriggerKind::Periodic)
        .await
        .map_err(internal_error)?;

    Ok(Json(TickResponse {
        next_due: opportunistic_next.min(periodic_next),
        opportunistic_next,
        periodic_next,
    }))
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub now: i64,
    pub entries: Schedule,
}

/// Operator view of the persisted schedule.
pub async fn cron_schedule(State(state): State<Arc<AppState>>) -> Json<ScheduleResponse> {
    let entries = Schedule::load(state.store.as_ref()).await;
    Json(ScheduleResponse {
        now: state.clock.now(),
        entries,
    })
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
