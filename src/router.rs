use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use pest_risk_backend::error::{error_codes, ErrorResponse};
use pest_risk_backend::id_generator::IdGenerator;

pub const SERVICE_NAME: &str = "pest-risk-backend";

#[derive(Clone)]
pub struct AppState {
    id_generator: Arc<dyn IdGenerator>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Routes for the liveness server
///
/// Handlers never touch the database or the weather API, so the health check
/// reflects only that the process is running.
pub fn build_router(id_generator: Arc<dyn IdGenerator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/", get(health_check))
        .fallback(not_found)
        .with_state(AppState { id_generator })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn not_found(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> (StatusCode, Json<ErrorResponse>) {
    let request_id = state.id_generator.uuid_v4();
    warn!(
        request_id = %request_id,
        method = %method,
        path = %uri.path(),
        "Unknown route"
    );

    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            error_codes::NOT_FOUND,
            format!("Route {} {} not found", method, uri.path()),
            request_id,
        )),
    )
}
