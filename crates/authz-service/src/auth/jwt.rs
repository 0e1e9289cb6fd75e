//! Bearer token validation against the key cache.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only the `kid` is read before the signature is verified
//! - The verification algorithm comes from the cached key, not the token
//! - Expiry, audience and issued-at are checked only on verified claims
//! - Failure causes are logged at debug and never returned to callers

use crate::auth::claims::Claims;
use crate::auth::jwks::{KeyCache, KeySet};
use crate::errors::ValidationError;
use common::jwt::{decode_segment, extract_kid, split_token, validate_iat};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Validator bound to the process key cache and the expected app client.
pub struct TokenValidator {
    key_cache: Arc<KeyCache>,
    expected_audience: String,
    clock_skew: Duration,
}

impl TokenValidator {
    pub fn new(key_cache: Arc<KeyCache>, expected_audience: String, clock_skew: Duration) -> Self {
        Self {
            key_cache,
            expected_audience,
            clock_skew,
        }
    }

    /// Validate `token` at `now` (Unix seconds).
    #[instrument(skip_all)]
    pub fn validate(&self, token: &str, now: i64) -> Result<Claims, ValidationError> {
        validate_token(
            token,
            self.key_cache.key_set(),
            &self.expected_audience,
            self.clock_skew,
            now,
        )
    }
}

/// Validate a compact JWT and return its verified claims.
///
/// # Checks, in order
///
/// 1. Size and shape, then `kid` from the unverified header
/// 2. `kid` must be in `keys` (no refetch)
/// 3. Signature over `header.payload` with the key's own algorithm
/// 4. Payload decodes into [`Claims`]
/// 5. Not expired at `now`
/// 6. Audience matches `expected_audience`
/// 7. `iat`, when present, is not beyond `clock_skew` in the future
pub fn validate_token(
    token: &str,
    keys: &KeySet,
    expected_audience: &str,
    clock_skew: Duration,
    now: i64,
) -> Result<Claims, ValidationError> {
    let segments = split_token(token).map_err(|e| {
        tracing::debug!(target: "authz.auth.jwt", error = ?e, "Token structure rejected");
        ValidationError::from(e)
    })?;

    let kid = extract_kid(token).map_err(|e| {
        tracing::debug!(target: "authz.auth.jwt", error = ?e, "Token kid extraction failed");
        ValidationError::from(e)
    })?;

    let key = keys.lookup(&kid).ok_or_else(|| {
        tracing::debug!(target: "authz.auth.jwt", kid = %kid, "Token kid not in key cache");
        ValidationError::UnknownKey
    })?;

    let verified = jsonwebtoken::crypto::verify(
        segments.signature,
        segments.signing_input().as_bytes(),
        key.decoding_key(),
        key.algorithm(),
    )
    .unwrap_or_else(|e| {
        tracing::debug!(target: "authz.auth.jwt", error = %e, "Signature could not be checked");
        false
    });

    if !verified {
        tracing::debug!(
            target: "authz.auth.jwt",
            kid = key.key_id(),
            algorithm = ?key.algorithm(),
            "Token signature verification failed"
        );
        return Err(ValidationError::SignatureInvalid);
    }

    let claims: Claims = decode_segment(segments.payload).map_err(|e| {
        tracing::debug!(target: "authz.auth.jwt", error = ?e, "Verified payload is not valid claims");
        ValidationError::MalformedToken
    })?;

    if claims.is_expired_at(now) {
        tracing::debug!(target: "authz.auth.jwt", exp = claims.exp, now = now, "Token expired");
        return Err(ValidationError::Expired);
    }

    if !claims.audience_matches(expected_audience) {
        tracing::debug!(target: "authz.auth.jwt", "Token audience mismatch");
        return Err(ValidationError::AudienceMismatch);
    }

    if let Some(iat) = claims.iat {
        validate_iat(iat, clock_skew, now).map_err(|e| {
            tracing::debug!(target: "authz.auth.jwt", error = ?e, "Token iat validation failed");
            ValidationError::from(e)
        })?;
    }

    tracing::debug!(target: "authz.auth.jwt", groups = claims.groups.len(), "Token validated successfully");
    Ok(claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::auth::testing::TestKeypair;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_JWT_SIZE_BYTES};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;
    const AUDIENCE: &str = "app123";

    fn cache_with(keypairs: &[&TestKeypair]) -> KeyCache {
        let keys: Vec<_> = keypairs.iter().map(|k| k.jwk()).collect();
        KeyCache::from_jwks(
            "http://localhost/jwks.json",
            serde_json::from_value(json!({ "keys": keys })).unwrap(),
        )
        .unwrap()
    }

    fn valid_claims() -> serde_json::Value {
        json!({
            "sub": "user-1",
            "exp": NOW + 3600,
            "iat": NOW,
            "client_id": AUDIENCE,
            "cognito:groups": ["admins"],
            "token_use": "access",
            "username": "alice"
        })
    }

    fn validate(token: &str, cache: &KeyCache) -> Result<Claims, ValidationError> {
        validate_token(token, cache.key_set(), AUDIENCE, DEFAULT_CLOCK_SKEW, NOW)
    }

    #[test]
    fn test_valid_token_returns_claims() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);

        let claims = validate(&keypair.sign(&valid_claims()), &cache).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.groups, vec!["admins"]);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let token = keypair.sign(&valid_claims());

        let first = validate(&token, &cache).unwrap();
        let second = validate(&token, &cache).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_kid() {
        let cached = TestKeypair::new("key-1");
        let stranger = TestKeypair::new("key-2");
        let cache = cache_with(&[&cached]);

        let result = validate(&stranger.sign(&valid_claims()), &cache);
        assert_eq!(result, Err(ValidationError::UnknownKey));
    }

    #[test]
    fn test_signature_from_wrong_key_with_same_kid() {
        let cached = TestKeypair::new("key-1");
        let impostor = TestKeypair::new("key-1");
        let cache = cache_with(&[&cached]);

        let result = validate(&impostor.sign(&valid_claims()), &cache);
        assert_eq!(result, Err(ValidationError::SignatureInvalid));
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let token = keypair.sign(&valid_claims());

        let mut forged = valid_claims();
        forged["cognito:groups"] = json!(["superusers"]);
        let forged_payload = URL_SAFE_NO_PAD.encode(forged.to_string());
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(
            validate(&tampered, &cache),
            Err(ValidationError::SignatureInvalid)
        );
    }

    #[test]
    fn test_undecodable_signature() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let token = keypair.sign(&valid_claims());
        let (signing_input, _) = token.rsplit_once('.').unwrap();

        let result = validate(&format!("{}.!!!", signing_input), &cache);
        assert_eq!(result, Err(ValidationError::SignatureInvalid));
    }

    #[test]
    fn test_header_alg_is_ignored() {
        // Claims HS256 in the header, but the cached key is EdDSA
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let token = keypair.sign(&valid_claims());
        let parts: Vec<&str> = token.split('.').collect();
        let hs_header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT","kid":"key-1"}"#);
        let swapped = format!("{}.{}.{}", hs_header, parts[1], parts[2]);

        assert_eq!(
            validate(&swapped, &cache),
            Err(ValidationError::SignatureInvalid)
        );
    }

    #[test]
    fn test_malformed_structure() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);

        for token in ["", "single", "only.two", "a.b.c.d", "..", "!!!.payload.sig"] {
            assert_eq!(
                validate(token, &cache),
                Err(ValidationError::MalformedToken),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_oversized_token_is_malformed() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims["padding"] = json!("x".repeat(MAX_JWT_SIZE_BYTES));

        assert_eq!(
            validate(&keypair.sign(&claims), &cache),
            Err(ValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_verified_payload_missing_exp_is_malformed() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let claims = json!({"sub": "user-1", "client_id": AUDIENCE});

        assert_eq!(
            validate(&keypair.sign(&claims), &cache),
            Err(ValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_expired_token() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW - 1);

        assert_eq!(
            validate(&keypair.sign(&claims), &cache),
            Err(ValidationError::Expired)
        );
    }

    #[test]
    fn test_token_valid_at_exact_expiry() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW);

        assert!(validate(&keypair.sign(&claims), &cache).is_ok());
    }

    #[test]
    fn test_expiry_checked_before_audience() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW - 10);
        claims["client_id"] = json!("someone-else");

        assert_eq!(
            validate(&keypair.sign(&claims), &cache),
            Err(ValidationError::Expired)
        );
    }

    #[test]
    fn test_audience_mismatch() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims["client_id"] = json!("app456");

        assert_eq!(
            validate(&keypair.sign(&claims), &cache),
            Err(ValidationError::AudienceMismatch)
        );
    }

    #[test]
    fn test_id_token_audience() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("client_id");
        claims["aud"] = json!(AUDIENCE);
        claims["token_use"] = json!("id");

        assert!(validate(&keypair.sign(&claims), &cache).is_ok());
    }

    #[test]
    fn test_iat_too_far_in_future() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims["iat"] = json!(NOW + 3600);
        claims["exp"] = json!(NOW + 7200);

        assert_eq!(
            validate(&keypair.sign(&claims), &cache),
            Err(ValidationError::IssuedInFuture)
        );
    }

    #[test]
    fn test_iat_within_skew_is_accepted() {
        let keypair = TestKeypair::new("key-1");
        let cache = cache_with(&[&keypair]);
        let mut claims = valid_claims();
        claims["iat"] = json!(NOW + 60);

        assert!(validate(&keypair.sign(&claims), &cache).is_ok());
    }

    #[test]
    fn test_token_validator_uses_shared_cache() {
        let keypair = TestKeypair::new("key-1");
        let validator = TokenValidator::new(
            Arc::new(cache_with(&[&keypair])),
            AUDIENCE.to_string(),
            DEFAULT_CLOCK_SKEW,
        );

        let claims = validator
            .validate(&keypair.sign(&valid_claims()), NOW)
            .unwrap();
        assert_eq!(claims.client_id.as_deref(), Some(AUDIENCE));
    }
}
