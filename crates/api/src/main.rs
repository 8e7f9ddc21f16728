use std::time::Duration;

use anyhow::Result;
use persistence::memory::InMemoryDirectory;
use tracing::{info, warn};

use shop_crm_api::app;
use shop_crm_api::config::Config;
use shop_crm_api::jobs::{JobScheduler, MessageDispatchJob, PoolMetricsJob, WorkflowScheduleJob};
use shop_crm_api::middleware;
use shop_crm_api::services::{build_gateway, Dependencies, Services};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting Shop CRM API v{}", env!("CARGO_PKG_VERSION"));

    let gateway = build_gateway(&config.gateway)?;

    let (deps, pool) = if config.database.is_configured() {
        let pool = persistence::db::create_pool(&config.database.pool_config()).await?;
        persistence::db::run_migrations(&pool).await?;
        (Dependencies::postgres(pool.clone(), gateway), Some(pool))
    } else {
        warn!("No database configured, using in-memory stores");
        (Dependencies::in_memory(InMemoryDirectory::new(), gateway), None)
    };

    let services = Services::new(&deps, &config);

    let mut scheduler = JobScheduler::new();
    if config.dispatch.enabled {
        scheduler.register(MessageDispatchJob::new(
            services.dispatcher.clone(),
            config.dispatch.interval_secs,
        ));
    }
    if config.workflows.enabled {
        scheduler.register(WorkflowScheduleJob::new(
            deps.workflows.clone(),
            services.runner.clone(),
            config.workflows.interval_secs,
            config.workflows.batch_size,
        ));
    }
    if let Some(pool) = &pool {
        scheduler.register(PoolMetricsJob::new(
            pool.clone(),
            config.database.max_connections,
        ));
    }
    scheduler.start();

    let app = app::create_app(config.clone(), services, pool);

    let addr = config.socket_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
