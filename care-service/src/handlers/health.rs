use service_core::{
    axum::{extract::State, response::IntoResponse, Json},
    error::AppError,
    observability::render_metrics,
};

use crate::AppState;

/// Liveness plus a store round-trip.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable("Database unavailable".to_string())
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}

pub async fn metrics() -> impl IntoResponse {
    render_metrics()
}
