//! Test server harness for E2E testing
//!
//! Provides `TestAuthzServer` for spawning a real authorizer instance in
//! tests, with its signing keys served from a mock JWKS endpoint.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use authz_service::auth::KeyCache;
use authz_service::config::Config;
use authz_service::models::{AuthorizerRequest, AuthorizerResponse};
use authz_service::repositories::LookupStore;
use authz_service::routes::{self, AppState};
use authz_service::services::Authorizer;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Application client id the harness configures as the expected audience.
pub const TEST_APP_CLIENT_ID: &str = "app123";

/// Test harness for spawning the authorizer in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_allow_flow_e2e() -> Result<()> {
///     let key = TestSigningKey::ed25519("k1", 1)?;
///     let store = Arc::new(MockLookupStore::new().with_policy("admins", allow_policy("arn:items")));
///     let server = TestAuthzServer::spawn(&[&key], store).await?;
///
///     let token = TestClaimsBuilder::new().with_groups(&["admins"]).sign(&key);
///     let response = server.authorize(&bearer_request(&token)).await?;
///
///     assert_eq!(response.principal_id, "test-subject");
///     Ok(())
/// }
/// ```
pub struct TestAuthzServer {
    addr: SocketAddr,
    config: Config,
    key_cache: Arc<KeyCache>,
    jwks_server: MockServer,
    client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestAuthzServer {
    /// Spawn with default settings.
    pub async fn spawn(
        keys: &[&TestSigningKey],
        store: Arc<dyn LookupStore>,
    ) -> Result<Self, anyhow::Error> {
        Self::spawn_with(keys, store, HashMap::new()).await
    }

    /// Spawn a new test server instance.
    ///
    /// The server will:
    /// - Serve `keys` as a JWKS document from a wiremock server
    /// - Load its key cache from that endpoint, as at startup
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    ///
    /// `overrides` replace or add configuration variables.
    pub async fn spawn_with(
        keys: &[&TestSigningKey],
        store: Arc<dyn LookupStore>,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let jwks_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&jwks_server)
            .await;

        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "JWKS_URL".to_string(),
                format!("{}/.well-known/jwks.json", jwks_server.uri()),
            ),
            (
                "COGNITO_APP_CLIENT_ID".to_string(),
                TEST_APP_CLIENT_ID.to_string(),
            ),
            // Only parsed; the harness injects its own store.
            ("POLICY_FILE".to_string(), "/dev/null".to_string()),
            ("BATCH_GET_BACKOFF_MS".to_string(), "1".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let key_cache = KeyCache::initialize(
            &config.jwks_url,
            Duration::from_secs(config.jwks_fetch_timeout_seconds),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load test key set: {}", e))?;
        let key_cache = Arc::new(key_cache);

        let authorizer = Arc::new(Authorizer::from_config(
            &config,
            Arc::clone(&key_cache),
            Arc::clone(&store),
        ));
        let state = Arc::new(AppState {
            authorizer,
            key_cache: Arc::clone(&key_cache),
            store,
        });

        // Local handle, so tests never race over the global recorder
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            key_cache,
            jwks_server,
            client: reqwest::Client::new(),
            _handle: handle,
        })
    }

    /// POST `request` to `/authorize` and decode the decision.
    pub async fn authorize(
        &self,
        request: &AuthorizerRequest,
    ) -> Result<AuthorizerResponse, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/authorize", self.url()))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("/authorize returned HTTP {}", response.status());
        }

        Ok(response.json().await?)
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key cache the server loaded at spawn.
    pub fn key_cache(&self) -> &KeyCache {
        &self.key_cache
    }

    /// Number of requests the mock JWKS endpoint has served.
    pub async fn jwks_fetch_count(&self) -> usize {
        self.jwks_server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

impl Drop for TestAuthzServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
