//! HTTP routes.
//!
//! Defines the Axum router and application state.

use crate::auth::jwks::KeyCache;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::repositories::LookupStore;
use crate::services::Authorizer;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Decision engine.
    pub authorizer: Arc<Authorizer>,

    /// Signing keys loaded at startup, for readiness.
    pub key_cache: Arc<KeyCache>,

    /// Policy store, for readiness.
    pub store: Arc<dyn LookupStore>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/authorize` - Authorization decision (POST)
/// - `/health` - Liveness probe
/// - `/ready` - Readiness probe (key cache + lookup store)
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/authorize", post(handlers::authorize))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenValidator;
    use crate::auth::testing::TestKeypair;
    use crate::errors::ResolverError;
    use crate::models::AuthorizerResponse;
    use crate::policy::decision::deny_policy;
    use crate::repositories::lookup_store::{BatchGetOutput, BatchGetRequest};
    use crate::repositories::InMemoryLookupStore;
    use crate::services::{DecisionSettings, PolicyResolver, RetryPolicy};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::jwt::DEFAULT_CLOCK_SKEW;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;
    use tower::ServiceExt;

    struct UnreachableStore;

    #[async_trait]
    impl LookupStore for UnreachableStore {
        async fn batch_get(&self, _: BatchGetRequest<'_>) -> Result<BatchGetOutput, ResolverError> {
            Err(ResolverError::Store("connection refused".to_string()))
        }

        async fn ping(&self) -> Result<(), ResolverError> {
            Err(ResolverError::Store("connection refused".to_string()))
        }
    }

    fn test_app(keypair: &TestKeypair, store: Arc<dyn LookupStore>) -> Router {
        let key_cache = Arc::new(
            KeyCache::from_jwks(
                "http://localhost/jwks.json",
                serde_json::from_value(json!({ "keys": [keypair.jwk()] })).unwrap(),
            )
            .unwrap(),
        );
        let authorizer = Authorizer::new(
            TokenValidator::new(key_cache.clone(), "app123".to_string(), DEFAULT_CLOCK_SKEW),
            PolicyResolver::new(store.clone(), "group_policies", "group", RetryPolicy::default()),
            DecisionSettings {
                deny_principal_id: "anonymous".to_string(),
                usage_identifier_key: "{api-key}".to_string(),
                request_timeout: Duration::from_secs(3),
            },
        );
        let state = Arc::new(AppState {
            authorizer: Arc::new(authorizer),
            key_cache,
            store,
        });
        let handle = PrometheusBuilder::new().build_recorder().handle();
        build_routes(state, handle)
    }

    fn admins_store() -> Arc<dyn LookupStore> {
        Arc::new(InMemoryLookupStore::new("group_policies", "group").with_item(
            "admins",
            json!({
                "Version": "2012-10-17",
                "Statement": [{"Action": "execute-api:Invoke", "Effect": "Allow", "Resource": "arn:items"}]
            }),
        ))
    }

    async fn post_authorize(app: Router, body: serde_json::Value) -> (StatusCode, AuthorizerResponse) {
        let request = Request::builder()
            .method("POST")
            .uri("/authorize")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_authorize_allows_valid_token() {
        let keypair = TestKeypair::new("key-1");
        let now = chrono::Utc::now().timestamp();
        let token = keypair.sign(&json!({
            "sub": "user-1",
            "exp": now + 3600,
            "client_id": "app123",
            "cognito:groups": ["admins"]
        }));

        let (status, response) = post_authorize(
            test_app(&keypair, admins_store()),
            json!({
                "type": "REQUEST",
                "methodArn": "arn:aws:execute-api:eu-west-1:123456789012:abc/prod/GET/items",
                "headers": {"Authorization": format!("Bearer {}", token)}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.principal_id, "user-1");
        assert_ne!(response.policy_document, deny_policy());
    }

    #[tokio::test]
    async fn test_authorize_denies_with_ok_status() {
        let keypair = TestKeypair::new("key-1");

        let (status, response) = post_authorize(
            test_app(&keypair, admins_store()),
            json!({"type": "REQUEST", "headers": null}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.principal_id, "anonymous");
        assert_eq!(response.policy_document, deny_policy());
    }

    #[tokio::test]
    async fn test_authorize_rejects_unparseable_body() {
        let keypair = TestKeypair::new("key-1");
        let request = Request::builder()
            .method("POST")
            .uri("/authorize")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = test_app(&keypair, admins_store())
            .oneshot(request)
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_ready_when_store_reachable() {
        let keypair = TestKeypair::new("key-1");
        let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();

        let response = test_app(&keypair, admins_store())
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_ready_when_store_unreachable() {
        let keypair = TestKeypair::new("key-1");
        let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();

        let response = test_app(&keypair, Arc::new(UnreachableStore))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Service dependencies unavailable");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders() {
        let keypair = TestKeypair::new("key-1");
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();

        let response = test_app(&keypair, admins_store())
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
