use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub cron: CronConfig,
    pub smtp: SmtpConfig,
    pub webhook: WebhookConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            postgres: PostgresConfig::from_env(),
            cron: CronConfig::from_env(),
            smtp: SmtpConfig::from_env(),
            webhook: WebhookConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  postgres: host={}, db={}",
            self.postgres.host,
            self.postgres.database
        );
        tracing::info!(
            "  cron:     debug={}, dump_dir={}",
            self.cron.debug_mode,
            self.cron.dump_dir.display()
        );
        tracing::info!(
            "  smtp:     host={}, admins={}",
            self.smtp.host.as_deref().unwrap_or("(none)"),
            self.smtp.admin_to.len()
        );
        tracing::info!(
            "  webhook:  {}",
            if self.webhook.url.is_some() { "configured" } else { "(none)" }
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    /// Public base URL of this deployment, used in operator alerts.
    pub site_url: String,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_u16("PORT", 3020),
            cors_origin: env_or("CORS_ORIGIN", "*"),
            site_url: env_or("SITE_URL", "http://localhost:3020"),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("PG_HOST", "localhost"),
            port: env_u16("PG_PORT", 5432),
            database: env_or("PG_DATABASE", "cachetrail"),
            username: env_opt("PG_USERNAME"),
            password: env_opt("PG_PASSWORD"),
            ssl_mode: env_or("PG_SSL_MODE", "prefer"),
            max_connections: env_u32("PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

// ── Cron ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Development deployments skip heavyweight jobs (fulldump).
    pub debug_mode: bool,
    /// Where the fulldump job writes its archives.
    pub dump_dir: PathBuf,
}

impl CronConfig {
    fn from_env() -> Self {
        Self {
            debug_mode: env_bool("CRON_DEBUG", false),
            dump_dir: PathBuf::from(env_or("DUMP_DIR", "data/dumps")),
        }
    }
}

// ── SMTP (operator alerts) ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: bool,
    pub from: String,
    /// Operator addresses that receive watchdog alerts.
    pub admin_to: Vec<String>,
}

impl SmtpConfig {
    fn from_env() -> Self {
        Self {
            host: env_opt("SMTP_HOST"),
            port: env_opt("SMTP_PORT").and_then(|v| v.parse().ok()),
            tls: env_bool("SMTP_TLS", true),
            from: env_or("SMTP_FROM", "alerts@cachetrail.local"),
            admin_to: env_opt("ADMIN_EMAILS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some() && !self.admin_to.is_empty()
    }
}

// ── Webhook (operator alerts) ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
}

impl WebhookConfig {
    fn from_env() -> Self {
        Self { url: env_opt("ALERT_WEBHOOK_URL") }
    }
}
