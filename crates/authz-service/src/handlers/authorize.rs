//! Authorization decision endpoint.

use crate::models::{AuthorizerRequest, AuthorizerResponse};
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Handler for POST /authorize
///
/// Always answers 200 with a decision. Denies carry no hint of their cause.
#[tracing::instrument(skip_all, name = "authz.handler.authorize")]
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuthorizerRequest>,
) -> Json<AuthorizerResponse> {
    Json(state.authorizer.authorize(&request).await)
}
