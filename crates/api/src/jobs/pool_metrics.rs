//! Connection pool gauges for the Postgres backend.
//!
//! The dispatch and workflow jobs share the request pool, so a pool that
//! stays exhausted shows up here before passes start timing out.

use std::time::Duration;

use sqlx::PgPool;
use tracing::warn;

use super::scheduler::Job;

pub struct PoolMetricsJob {
    pool: PgPool,
    max_connections: u32,
}

impl PoolMetricsJob {
    pub fn new(pool: PgPool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }
}

/// True when every allowed connection is checked out.
fn is_exhausted(size: u32, idle: usize, max_connections: u32) -> bool {
    max_connections > 0 && size >= max_connections && idle == 0
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn delay(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(&self.pool);

        let size = self.pool.size();
        if is_exhausted(size, self.pool.num_idle(), self.max_connections) {
            warn!(
                connections = size,
                max_connections = self.max_connections,
                "Database pool exhausted, dispatch and workflow passes may stall"
            );
        }
        Ok(())
    }
}
