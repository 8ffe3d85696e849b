use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::{database, AppState};

pub mod workflows;

pub use workflows::{event_config_routes, workflow_event_routes, workflow_routes};

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = database::health_check(&state.db_pool).await;
    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database_ok { "healthy" } else { "degraded" },
            "service": "soporte-workflows",
            "database": database::pool_stats(&state.db_pool),
        })),
    )
}
