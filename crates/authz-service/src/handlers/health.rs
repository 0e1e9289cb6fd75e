//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - key cache loaded and lookup store reachable

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler. Checks no dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 if the key cache holds signing keys and the lookup store
/// answers a ping, 503 otherwise.
///
/// ## Security
///
/// Error messages are intentionally generic. Actual errors are logged
/// server-side.
#[tracing::instrument(skip_all, name = "authz.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let signing_keys = state.key_cache.key_set().len();
    if signing_keys == 0 {
        tracing::warn!(target: "authz.service", "Readiness check failed: no signing keys");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                signing_keys: Some(0),
                lookup_store: None,
                error: Some("Service dependencies unavailable"),
            }),
        );
    }

    if let Err(e) = state.store.ping().await {
        tracing::warn!(target: "authz.service", error = %e, "Readiness check failed: lookup store");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                signing_keys: Some(signing_keys),
                lookup_store: Some("unavailable"),
                error: Some("Service dependencies unavailable"),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            signing_keys: Some(signing_keys),
            lookup_store: Some("available"),
            error: None,
        }),
    )
}
