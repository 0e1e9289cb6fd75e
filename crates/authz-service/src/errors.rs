//! Authorizer error types.
//!
//! Every request-path error collapses into the same DENY response at the
//! service boundary. The variants exist for internal logging and metrics
//! only; none of them is ever rendered to the caller.

use common::jwt::JwtValidationError;
use thiserror::Error;

/// Failure to pull a bearer token out of the request headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Authorization header has {0} space-separated components, expected 2")]
    MalformedHeader(usize),

    #[error("Authorization scheme is not Bearer")]
    UnsupportedScheme,
}

/// Failure to validate a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Token is structurally malformed")]
    MalformedToken,

    #[error("Token key id is not in the key cache")]
    UnknownKey,

    #[error("Token signature verification failed")]
    SignatureInvalid,

    #[error("Token is expired")]
    Expired,

    #[error("Token audience does not match")]
    AudienceMismatch,

    #[error("Token issued-at is in the future")]
    IssuedInFuture,
}

impl From<JwtValidationError> for ValidationError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge
            | JwtValidationError::MalformedToken
            | JwtValidationError::MissingKid => ValidationError::MalformedToken,
            JwtValidationError::IatTooFarInFuture => ValidationError::IssuedInFuture,
        }
    }
}

/// Failure while fetching policy records from the lookup store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("Lookup store error: {0}")]
    Store(String),

    #[error("Malformed policy record: {0}")]
    MalformedRecord(String),

    #[error("{remaining} keys still unprocessed after {attempts} batch-get attempts")]
    UnprocessedKeysExhausted { remaining: usize, attempts: u32 },
}

impl From<sqlx::Error> for ResolverError {
    fn from(err: sqlx::Error) -> Self {
        ResolverError::Store(err.to_string())
    }
}

/// Failure to build the key cache at startup. Always fatal.
#[derive(Debug, Error)]
pub enum KeyCacheError {
    #[error("Failed to fetch JWKS: {0}")]
    Fetch(String),

    #[error("JWKS endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Malformed JWKS document: {0}")]
    MalformedKeySet(String),

    #[error("Unusable key {kid}: {reason}")]
    InvalidKey { kid: String, reason: String },

    #[error("JWKS contained no usable signing keys")]
    Empty,
}

/// Top-level authorization failure. Always mapped to DENY.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Credential extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Token validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Policy resolution failed: {0}")]
    Resolver(#[from] ResolverError),

    #[error("No policy records found for the claimed groups")]
    NoRecords,

    #[error("Authorization decision timed out")]
    Timeout,
}

impl AuthzError {
    /// Bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::Extraction(ExtractionError::MissingHeader) => "missing_header",
            AuthzError::Extraction(_) => "malformed_header",
            AuthzError::Validation(ValidationError::MalformedToken) => "malformed_token",
            AuthzError::Validation(ValidationError::UnknownKey) => "unknown_key",
            AuthzError::Validation(ValidationError::SignatureInvalid) => "signature_invalid",
            AuthzError::Validation(ValidationError::Expired) => "expired",
            AuthzError::Validation(ValidationError::AudienceMismatch) => "audience_mismatch",
            AuthzError::Validation(ValidationError::IssuedInFuture) => "issued_in_future",
            AuthzError::Resolver(ResolverError::Store(_)) => "store_error",
            AuthzError::Resolver(ResolverError::MalformedRecord(_)) => "malformed_record",
            AuthzError::Resolver(ResolverError::UnprocessedKeysExhausted { .. }) => {
                "unprocessed_keys"
            }
            AuthzError::NoRecords => "no_records",
            AuthzError::Timeout => "timeout",
        }
    }
}
