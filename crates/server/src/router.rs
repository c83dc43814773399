//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::AppState;
use crate::{api, hooks};

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    let origin = match cors_origin {
        "*" => AllowOrigin::any(),
        other => match other.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => AllowOrigin::any(),
        },
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health))
        .route("/cron/tick", post(api::cron_tick))
        .route("/cron/schedule", get(api::cron_schedule))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            hooks::cron_hook,
        ))
        .layer(cors)
        .with_state(state)
}
