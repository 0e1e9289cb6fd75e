//! JWT parsing utilities shared by the authorizer crates.
//!
//! These helpers operate on the *unverified* compact serialization of a
//! token. They exist so that the verifier can pick a key by `kid` and
//! reconstruct the exact signing input without trusting anything else in
//! the token.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any decoding (DoS prevention)
//! - Only the header may be read before signature verification; payload
//!   decoding is exposed separately and must only be called afterwards
//! - Error messages are intentionally generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_kid, split_token, decode_segment};
//!
//! let kid = extract_kid(token)?;
//! let segments = split_token(token)?;
//! // ... verify segments.signing_input() against segments.signature ...
//! let claims: MyClaims = decode_segment(segments.payload)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (8KB).
///
/// Identity-provider access tokens are typically 800-1500 bytes; a user in
/// many groups grows the `cognito:groups` claim, so the limit leaves room for
/// that while still rejecting oversized input before base64 work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance for `iat` (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced while parsing an unverified JWT.
///
/// The Display text is identical for every variant so it can never be used
/// to tell callers which check failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not three base64url segments, or a segment does not decode.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// `iat` is further in the future than the clock skew allows.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Token Segments
// =============================================================================

/// Borrowed view over the three segments of a compact JWT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSegments<'a> {
    /// Base64url header segment.
    pub header: &'a str,
    /// Base64url payload segment. Do not decode before the signature is verified.
    pub payload: &'a str,
    /// Base64url signature segment.
    pub signature: &'a str,
    signing_input: &'a str,
}

impl<'a> TokenSegments<'a> {
    /// The bytes the issuer signed: `header.payload`, exactly as received.
    #[must_use]
    pub fn signing_input(&self) -> &'a str {
        self.signing_input
    }
}

/// Split a compact JWT into its segments.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` unless the token is exactly three dot-separated,
///   non-empty segments
pub fn split_token(token: &str) -> Result<TokenSegments<'_>, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let (signing_input, signature) = token.rsplit_once('.').ok_or_else(|| {
        tracing::debug!(target: "common.jwt", "Token rejected: no segment separator");
        JwtValidationError::MalformedToken
    })?;

    let (header, payload) = signing_input.split_once('.').ok_or_else(|| {
        tracing::debug!(target: "common.jwt", "Token rejected: expected three segments");
        JwtValidationError::MalformedToken
    })?;

    if payload.contains('.') {
        tracing::debug!(target: "common.jwt", "Token rejected: more than three segments");
        return Err(JwtValidationError::MalformedToken);
    }

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty segment");
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(TokenSegments {
        header,
        payload,
        signature,
        signing_input,
    })
}

/// Decode a base64url JSON segment into `T`.
///
/// # Errors
///
/// Returns `MalformedToken` if the segment is not base64url or not valid JSON
/// for `T`.
pub fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT segment JSON");
        JwtValidationError::MalformedToken
    })
}

/// Extract the `kid` from a JWT header without verifying the signature.
///
/// The returned value may only be used to select a key from a trusted key
/// set. Nothing else in the token is read.
///
/// # Errors
///
/// - `TokenTooLarge` / `MalformedToken` from [`split_token`] or header decoding
/// - `MissingKid` if the header has no string `kid`, or it is empty
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let segments = split_token(token)?;
    let header: serde_json::Value = decode_segment(segments.header)?;

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Reject an `iat` claim further than `clock_skew` in the future.
///
/// `now` is passed in so callers can validate against a fixed instant.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat > now + clock_skew`.
pub fn validate_iat(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW at config load
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
