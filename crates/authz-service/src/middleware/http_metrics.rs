//! HTTP metrics middleware.
//!
//! Runs outermost so it also sees responses produced before a handler
//! runs, such as 400 for an unparseable body, 404, 405 and 415.

use crate::observability::metrics::record_http_request;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Record method, normalized path, status and duration of every request.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::{get, post},
        Json, Router,
    };
    use tower::ServiceExt;

    async fn echo(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        Json(body)
    }

    fn test_app() -> Router {
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/authorize", post(echo))
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    #[tokio::test]
    async fn test_passes_response_through() {
        let request = HttpRequest::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sees_framework_rejections() {
        let unsupported_media = HttpRequest::builder()
            .method("POST")
            .uri("/authorize")
            .body(Body::from("{}"))
            .expect("request builder should succeed");
        let response = test_app().oneshot(unsupported_media).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let wrong_method = HttpRequest::builder()
            .method("GET")
            .uri("/authorize")
            .body(Body::empty())
            .expect("request builder should succeed");
        let response = test_app().oneshot(wrong_method).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let not_found = HttpRequest::builder()
            .method("GET")
            .uri("/nonexistent")
            .body(Body::empty())
            .expect("request builder should succeed");
        let response = test_app().oneshot(not_found).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
