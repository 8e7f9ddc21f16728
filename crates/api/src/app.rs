use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{automatic_messages, health, message_settings, messages, workflows};
use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when running on the in-memory stores.
    pub pool: Option<PgPool>,
    pub services: Services,
}

pub fn create_app(config: Config, services: Services, pool: Option<PgPool>) -> Router {
    let config = Arc::new(config);

    let state = AppState {
        config: config.clone(),
        pool,
        services,
    };

    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let shop_routes = Router::new()
        // Messages
        .route(
            "/api/v1/shops/:shop_id/messages",
            post(messages::send_message).get(messages::list_messages),
        )
        .route(
            "/api/v1/shops/:shop_id/messages/:message_id",
            get(messages::get_message).put(messages::update_reservation),
        )
        .route(
            "/api/v1/shops/:shop_id/messages/:message_id/cancel",
            post(messages::cancel_message),
        )
        // Message settings
        .route(
            "/api/v1/shops/:shop_id/message-settings",
            post(message_settings::create_settings)
                .get(message_settings::get_settings)
                .put(message_settings::update_settings),
        )
        .route(
            "/api/v1/shops/:shop_id/message-settings/credits",
            post(message_settings::grant_credits),
        )
        // Automatic messages
        .route(
            "/api/v1/shops/:shop_id/automatic-messages",
            post(automatic_messages::register_automatic_message)
                .get(automatic_messages::list_automatic_messages),
        )
        .route(
            "/api/v1/shops/:shop_id/automatic-messages/fire",
            post(automatic_messages::fire_automatic_message),
        )
        .route(
            "/api/v1/shops/:shop_id/automatic-messages/:id",
            put(automatic_messages::update_automatic_message),
        )
        // Workflows
        .route(
            "/api/v1/shops/:shop_id/workflows",
            post(workflows::create_workflow).get(workflows::list_workflows),
        )
        .route(
            "/api/v1/shops/:shop_id/workflows/:workflow_id",
            get(workflows::get_workflow)
                .put(workflows::update_workflow)
                .delete(workflows::delete_workflow),
        )
        .route(
            "/api/v1/shops/:shop_id/workflows/:workflow_id/activate",
            post(workflows::activate_workflow),
        )
        .route(
            "/api/v1/shops/:shop_id/workflows/:workflow_id/deactivate",
            post(workflows::deactivate_workflow),
        )
        .route(
            "/api/v1/shops/:shop_id/workflows/:workflow_id/executions",
            get(workflows::list_executions),
        )
        .route(
            "/api/v1/shops/:shop_id/workflows/:workflow_id/run",
            post(workflows::run_workflow),
        );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(shop_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
