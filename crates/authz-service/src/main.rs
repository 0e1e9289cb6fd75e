//! Authorizer service
//!
//! Loads the signing key set once, connects the policy store, and serves
//! authorization decisions over HTTP.

use authz_service::auth::KeyCache;
use authz_service::config::{Config, PolicyStoreConfig};
use authz_service::observability::{init_tracing, metrics::init_metrics_recorder};
use authz_service::repositories::{InMemoryLookupStore, LookupStore, PgLookupStore};
use authz_service::routes::{self, AppState};
use authz_service::services::Authorizer;
use common::config::ObservabilityConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    match &config {
        Ok(config) => init_tracing(&config.observability),
        // Logging still comes up so the configuration error is reported
        Err(_) => init_tracing(&ObservabilityConfig::from_vars(&std::env::vars().collect())),
    }

    info!("Starting authorizer service");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        jwks_url = %config.jwks_url,
        table = %config.table_name,
        policy_store = ?config.policy_store,
        request_timeout_ms = config.request_timeout_ms,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // No key set, no service: the listener is never bound on failure
    let key_cache = KeyCache::initialize(
        &config.jwks_url,
        Duration::from_secs(config.jwks_fetch_timeout_seconds),
    )
    .await
    .map_err(|e| {
        error!("Failed to initialize signing key cache: {}", e);
        e
    })?;
    info!(
        jwks_url = key_cache.jwks_url(),
        signing_keys = key_cache.key_set().len(),
        "Signing key cache ready"
    );
    let key_cache = Arc::new(key_cache);

    let store: Arc<dyn LookupStore> = match &config.policy_store {
        PolicyStoreConfig::Postgres { database_url } => {
            info!("Connecting to policy database...");
            Arc::new(
                PgLookupStore::connect(database_url, &config.table_name, &config.partition_key)
                    .await?,
            )
        }
        PolicyStoreConfig::File { path } => Arc::new(
            InMemoryLookupStore::load_file(&config.table_name, &config.partition_key, path)
                .await
                .map_err(|e| {
                    error!("Failed to load policy file: {}", e);
                    e
                })?,
        ),
    };

    let authorizer = Arc::new(Authorizer::from_config(
        &config,
        Arc::clone(&key_cache),
        Arc::clone(&store),
    ));

    let state = Arc::new(AppState {
        authorizer,
        key_cache,
        store,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Authorizer listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Authorizer shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let drain_secs: u64 = std::env::var("AUTHZ_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    }
}
