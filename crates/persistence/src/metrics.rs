//! Query and pool metrics for the Postgres stores.

use std::time::Instant;

use metrics::{gauge, histogram};
use sqlx::PgPool;

/// Times one repository call.
///
/// ```ignore
/// let timer = QueryTimer::new("find_due_reservations");
/// let result = sqlx::query_as::<_, MessageEntity>(...).fetch_all(&self.pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }

    pub fn query(&self) -> &'static str {
        self.query
    }

    /// Records into `db_query_duration_seconds{query}`.
    pub fn record(self) {
        histogram!("db_query_duration_seconds", "query" => self.query)
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// Publishes connection pool gauges; called by the periodic pool job.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle() as u32;

    gauge!("db_pool_connections", "state" => "active").set(f64::from(size.saturating_sub(idle)));
    gauge!("db_pool_connections", "state" => "idle").set(f64::from(idle));
}
