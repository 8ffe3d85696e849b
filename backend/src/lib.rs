use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod notifications;
pub mod services;
pub mod workflows;

pub use error::{ApiError, ApiResult, AppError};

use workflows::{WorkflowEngine, WorkflowStore};

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub engine: WorkflowEngine,
    pub store: Arc<dyn WorkflowStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Soporte notification workflows v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflow-events", handlers::workflow_event_routes())
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .nest("/api/v1/notification-configs", handlers::event_config_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
