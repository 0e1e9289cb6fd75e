//! Authorizer configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use common::config::ObservabilityConfig;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default lookup table holding one policy record per group.
pub const DEFAULT_TABLE_NAME: &str = "group_policies";

/// Default partition key column of the lookup table.
pub const DEFAULT_PARTITION_KEY: &str = "group";

/// Default number of retries for keys a batch-get reports as unprocessed.
pub const DEFAULT_BATCH_GET_MAX_RETRIES: u32 = 3;

/// Upper bound for `BATCH_GET_MAX_RETRIES`.
pub const MAX_BATCH_GET_MAX_RETRIES: u32 = 10;

/// Default initial backoff between unprocessed-key retries.
pub const DEFAULT_BATCH_GET_BACKOFF_MS: u64 = 50;

/// Default per-decision timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;

/// Upper bound for `AUTHZ_REQUEST_TIMEOUT_MS`.
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default HTTP timeout for the startup JWKS fetch.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Principal reported on every deny.
pub const DEFAULT_DENY_PRINCIPAL_ID: &str = "anonymous";

/// `usageIdentifierKey` placed in every response.
pub const DEFAULT_USAGE_IDENTIFIER_KEY: &str = "{api-key}";

/// Where policy records are read from.
#[derive(Clone)]
pub enum PolicyStoreConfig {
    /// Postgres table queried per request.
    Postgres { database_url: SecretString },
    /// JSON array of records loaded into memory at startup.
    File { path: PathBuf },
}

impl fmt::Debug for PolicyStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyStoreConfig::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("database_url", &"[REDACTED]")
                .finish(),
            PolicyStoreConfig::File { path } => {
                f.debug_struct("File").field("path", path).finish()
            }
        }
    }
}

/// Authorizer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// JWKS discovery URL, fetched once at startup.
    pub jwks_url: String,

    /// App client id tokens must be issued for.
    pub app_client_id: String,

    /// Policy record source.
    pub policy_store: PolicyStoreConfig,

    /// Lookup table name (validated SQL identifier).
    pub table_name: String,

    /// Partition key column (validated SQL identifier).
    pub partition_key: String,

    /// Max retries of unprocessed keys per chunk.
    pub batch_get_max_retries: u32,

    /// Initial backoff between unprocessed-key retries.
    pub batch_get_backoff_ms: u64,

    /// Per-decision timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// HTTP timeout for the JWKS fetch.
    pub jwks_fetch_timeout_seconds: u64,

    /// Clock skew tolerance in seconds for `iat` validation.
    pub jwt_clock_skew_seconds: i64,

    /// Principal id placed in deny responses.
    pub deny_principal_id: String,

    /// Opaque value echoed as `usageIdentifierKey`.
    pub usage_identifier_key: String,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid lookup store configuration: {0}")]
    InvalidStore(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = match vars.get("JWKS_URL") {
            Some(url) => url.clone(),
            None => {
                let region = vars.get("AWS_REGION").ok_or_else(|| {
                    ConfigError::MissingEnvVar("JWKS_URL or AWS_REGION".to_string())
                })?;
                let pool_id = vars.get("COGNITO_USER_POOL_ID").ok_or_else(|| {
                    ConfigError::MissingEnvVar("JWKS_URL or COGNITO_USER_POOL_ID".to_string())
                })?;
                cognito_jwks_url(region, pool_id)
            }
        };

        let app_client_id = vars
            .get("COGNITO_APP_CLIENT_ID")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("COGNITO_APP_CLIENT_ID".to_string()))?
            .clone();

        // File store wins so local runs never need a database
        let policy_store = match (vars.get("POLICY_FILE"), vars.get("DATABASE_URL")) {
            (Some(path), _) => PolicyStoreConfig::File {
                path: PathBuf::from(path),
            },
            (None, Some(url)) => PolicyStoreConfig::Postgres {
                database_url: SecretString::from(url.clone()),
            },
            (None, None) => {
                return Err(ConfigError::InvalidStore(
                    "one of POLICY_FILE or DATABASE_URL must be set".to_string(),
                ))
            }
        };

        let table_name = parse_identifier(vars, "TABLE_NAME", DEFAULT_TABLE_NAME)?;
        let partition_key = parse_identifier(vars, "PARTITION_KEY", DEFAULT_PARTITION_KEY)?;

        let batch_get_max_retries = parse_bounded(
            vars,
            "BATCH_GET_MAX_RETRIES",
            u64::from(DEFAULT_BATCH_GET_MAX_RETRIES),
            0,
            u64::from(MAX_BATCH_GET_MAX_RETRIES),
        )?;
        // Bounded above by MAX_BATCH_GET_MAX_RETRIES
        let batch_get_max_retries =
            u32::try_from(batch_get_max_retries).unwrap_or(MAX_BATCH_GET_MAX_RETRIES);

        let batch_get_backoff_ms = parse_bounded(
            vars,
            "BATCH_GET_BACKOFF_MS",
            DEFAULT_BATCH_GET_BACKOFF_MS,
            0,
            1_000,
        )?;

        let request_timeout_ms = parse_bounded(
            vars,
            "AUTHZ_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
            1,
            MAX_REQUEST_TIMEOUT_MS,
        )?;

        let jwks_fetch_timeout_seconds = parse_bounded(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
            1,
            120,
        )?;

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let deny_principal_id = vars
            .get("DENY_PRINCIPAL_ID")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_DENY_PRINCIPAL_ID.to_string());

        let usage_identifier_key = vars
            .get("USAGE_IDENTIFIER_KEY")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USAGE_IDENTIFIER_KEY.to_string());

        Ok(Config {
            bind_address,
            jwks_url,
            app_client_id,
            policy_store,
            table_name,
            partition_key,
            batch_get_max_retries,
            batch_get_backoff_ms,
            request_timeout_ms,
            jwks_fetch_timeout_seconds,
            jwt_clock_skew_seconds,
            deny_principal_id,
            usage_identifier_key,
            observability: ObservabilityConfig::from_vars(vars),
        })
    }

    /// Per-decision timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Clock skew tolerance as a `Duration`.
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds.unsigned_abs())
    }
}

/// Well-known JWKS location of a Cognito user pool.
pub fn cognito_jwks_url(region: &str, user_pool_id: &str) -> String {
    format!(
        "https://cognito-idp.{}.amazonaws.com/{}/.well-known/jwks.json",
        region, user_pool_id
    )
}

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
fn parse_identifier(
    vars: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = vars.get(name).map(String::as_str).unwrap_or(default);

    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || value.len() > 63 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("'{}' is not a plain SQL identifier", value),
        });
    }

    Ok(value.to_string())
}

fn parse_bounded(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid non-negative integer, got '{}': {}", value_str, e),
    })?;

    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be between {} and {}, got {}", min, max, value),
        });
    }

    Ok(value)
}
