mod api;
mod hooks;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cachetrail_core::{Clock, Config, SystemClock};
use cachetrail_cron::jobs::{default_registry, JobDeps};
use cachetrail_cron::{CronController, TriggerKind};
use cachetrail_notify::{AlertDispatcher, EmailNotifier, Notifier, WebhookNotifier};
use cachetrail_store::{KeyValueStore, LockService, PgLocks, PgStore};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "cachetrail-server", about = "Geocaching API maintenance scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Run one scheduler tick (both trigger classes) and exit.
    Tick,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cachetrail_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.log_summary();

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Tick => tick(config).await,
    }
}

async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let pool = cachetrail_store::postgres::connect(&config.postgres)
        .await
        .context("connecting to postgres")?;

    let cache = PgStore::new(pool.clone());
    cache.migrate().await.context("migrating cache table")?;
    let store: Arc<dyn KeyValueStore> = Arc::new(cache.clone());
    let locks: Arc<dyn LockService> = Arc::new(PgLocks::new(pool.clone()));

    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
    if config.smtp.is_configured() {
        match EmailNotifier::from_config(&config.smtp) {
            Ok(email) => channels.push(Arc::new(email)),
            Err(e) => warn!("email alerts disabled: {e}"),
        }
    }
    if let Some(url) = &config.webhook.url {
        channels.push(Arc::new(WebhookNotifier::new(url)));
    }
    if channels.is_empty() {
        warn!("no alert channels configured; watchdog alerts will be dropped");
    }
    let notifier: Arc<dyn Notifier> = Arc::new(AlertDispatcher::new(channels));

    let deps = JobDeps {
        pool,
        cache,
        store: store.clone(),
        notifier,
        cron: config.cron.clone(),
        site_url: config.server.site_url.clone(),
    };
    let registry = default_registry(&deps).context("building job registry")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controller = Arc::new(CronController::new(registry, store.clone(), locks, clock.clone()));

    Ok(Arc::new(AppState::new(controller, store, clock)))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let app = router::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn tick(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config).await?;

    let opportunistic = state.controller.run(TriggerKind::Opportunistic).await?;
    let periodic = state.controller.run(TriggerKind::Periodic).await?;

    info!(
        opportunistic_next = opportunistic,
        periodic_next = periodic,
        "tick complete; nearest event at {}",
        opportunistic.min(periodic)
    );
    Ok(())
}
