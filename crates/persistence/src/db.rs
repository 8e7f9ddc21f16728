//! Postgres pool for the message, settings and workflow stores.

use std::time::{Duration, Instant};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Pool settings, built from the `[database]` config section.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Host and database part of the URL, without credentials, for logs.
    pub fn display_target(&self) -> &str {
        self.url
            .rsplit_once('@')
            .map(|(_, target)| target)
            .unwrap_or("<local>")
    }
}

/// Connects the pool shared by the repositories and the background jobs.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        target_db = %config.display_target(),
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to Postgres"
    );
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
}

/// Applies pending migrations from `src/migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Applying message store migrations");
    sqlx::migrate!("./src/migrations").run(pool).await?;
    tracing::info!("Message store schema is current");
    Ok(())
}

/// Round-trip time of a trivial query, or `None` when the database is
/// unreachable.
pub async fn ping(pool: &PgPool) -> Option<Duration> {
    let start = Instant::now();
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .ok()
        .map(|_| start.elapsed())
}
