//! Signing key cache, populated once from the JWKS discovery endpoint.
//!
//! The identity provider publishes its public signing keys at a well-known
//! `jwks.json` URL. They change rarely, so the authorizer fetches them
//! exactly once before it starts serving and never refetches: there is no
//! TTL, no refresh on unknown `kid`, and no writer after construction.
//!
//! # Security
//!
//! - Initialization failure is fatal; the process must not serve requests
//!   without a key set
//! - Symmetric (`oct`) keys and keys not marked for signatures are ignored
//! - Each key carries its own algorithm; the token header's `alg` is never
//!   trusted for verification

use crate::errors::KeyCacheError;
use crate::observability::metrics;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

/// JSON Web Key descriptor from the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA", "EC", "OKP" or "oct".
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Declared algorithm (e.g. "RS256").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC / OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// Key descriptors in published order.
    pub keys: Vec<Jwk>,
}

/// A public key ready for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered set of signing keys, unique by key id.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<SigningKey>,
    index: HashMap<String, usize>,
}

impl KeySet {
    /// Add a key. Returns `false` (and keeps the existing key) on a duplicate id.
    fn insert(&mut self, key: SigningKey) -> bool {
        if self.index.contains_key(&key.key_id) {
            return false;
        }
        self.index.insert(key.key_id.clone(), self.keys.len());
        self.keys.push(key);
        true
    }

    /// Look up a key by id.
    pub fn lookup(&self, key_id: &str) -> Option<&SigningKey> {
        self.index.get(key_id).and_then(|&i| self.keys.get(i))
    }

    /// Key ids in discovery order.
    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.iter().map(SigningKey::key_id).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Process-wide signing key cache.
///
/// Built once at startup and shared read-only as `Arc<KeyCache>`.
#[derive(Debug)]
pub struct KeyCache {
    jwks_url: String,
    keys: KeySet,
}

impl KeyCache {
    /// Fetch the JWKS document and build the cache.
    ///
    /// # Errors
    ///
    /// Any transport error, non-2xx status, undecodable document, unusable
    /// key material, or an empty resulting key set. All are fatal.
    #[instrument(skip_all, fields(url = %jwks_url))]
    pub async fn initialize(jwks_url: &str, fetch_timeout: Duration) -> Result<Self, KeyCacheError> {
        tracing::info!(target: "authz.auth.jwks", "Fetching JWKS");

        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| KeyCacheError::Fetch(e.to_string()))?;

        let response = http_client.get(jwks_url).send().await.map_err(|e| {
            tracing::error!(target: "authz.auth.jwks", error = %e, "Failed to fetch JWKS");
            KeyCacheError::Fetch(e.to_string())
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "authz.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeyCacheError::HttpStatus(response.status().as_u16()));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "authz.auth.jwks", error = %e, "Failed to parse JWKS response");
            KeyCacheError::MalformedKeySet(e.to_string())
        })?;

        Self::from_jwks(jwks_url, jwks)
    }

    /// Build the cache from an already-fetched JWKS document.
    pub fn from_jwks(jwks_url: &str, jwks: JwksResponse) -> Result<Self, KeyCacheError> {
        let mut keys = KeySet::default();

        for jwk in &jwks.keys {
            let Some(key) = build_signing_key(jwk)? else {
                continue;
            };
            if !keys.insert(key) {
                tracing::warn!(target: "authz.auth.jwks", kid = %jwk.kid, "Duplicate kid in JWKS, keeping first");
            }
        }

        if keys.is_empty() {
            tracing::error!(target: "authz.auth.jwks", "JWKS contained no usable signing keys");
            return Err(KeyCacheError::Empty);
        }

        tracing::info!(
            target: "authz.auth.jwks",
            key_count = keys.len(),
            kids = ?keys.key_ids(),
            "Key cache initialized"
        );
        metrics::set_jwks_keys_loaded(keys.len());

        Ok(Self {
            jwks_url: jwks_url.to_string(),
            keys,
        })
    }

    /// Look up a signing key by id. Never fetches.
    pub fn lookup(&self, key_id: &str) -> Option<&SigningKey> {
        self.keys.lookup(key_id)
    }

    pub fn key_set(&self) -> &KeySet {
        &self.keys
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

/// Convert a JWK into a verification key.
///
/// `Ok(None)` means the key is deliberately skipped (wrong use, symmetric,
/// or unsupported type); an `Err` means a supported key is unusable.
fn build_signing_key(jwk: &Jwk) -> Result<Option<SigningKey>, KeyCacheError> {
    if let Some(key_use) = &jwk.key_use {
        if key_use != "sig" {
            tracing::warn!(target: "authz.auth.jwks", kid = %jwk.kid, key_use = %key_use, "Skipping non-signing key");
            return Ok(None);
        }
    }

    let invalid = |reason: String| KeyCacheError::InvalidKey {
        kid: jwk.kid.clone(),
        reason,
    };

    let declared = jwk
        .alg
        .as_deref()
        .map(|alg| Algorithm::from_str(alg).map_err(|_| invalid(format!("unknown alg '{}'", alg))))
        .transpose()?;

    let (algorithm, decoding_key) = match jwk.kty.as_str() {
        "RSA" => {
            let algorithm = declared.unwrap_or(Algorithm::RS256);
            if !matches!(
                algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ) {
                return Err(invalid(format!("alg {:?} is not an RSA algorithm", algorithm)));
            }
            let n = jwk.n.as_deref().ok_or_else(|| invalid("missing n".to_string()))?;
            let e = jwk.e.as_deref().ok_or_else(|| invalid("missing e".to_string()))?;
            let key = DecodingKey::from_rsa_components(n, e).map_err(|e| invalid(e.to_string()))?;
            (algorithm, key)
        }
        "EC" => {
            let curve_alg = match jwk.crv.as_deref() {
                Some("P-256") => Algorithm::ES256,
                Some("P-384") => Algorithm::ES384,
                other => return Err(invalid(format!("unsupported EC curve {:?}", other))),
            };
            let algorithm = declared.unwrap_or(curve_alg);
            if algorithm != curve_alg {
                return Err(invalid(format!("alg {:?} does not match curve", algorithm)));
            }
            let x = jwk.x.as_deref().ok_or_else(|| invalid("missing x".to_string()))?;
            let y = jwk.y.as_deref().ok_or_else(|| invalid("missing y".to_string()))?;
            let key = DecodingKey::from_ec_components(x, y).map_err(|e| invalid(e.to_string()))?;
            (algorithm, key)
        }
        "OKP" => {
            if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                return Err(invalid(format!("unsupported OKP curve {:?}", jwk.crv)));
            }
            let algorithm = declared.unwrap_or(Algorithm::EdDSA);
            if algorithm != Algorithm::EdDSA {
                return Err(invalid(format!("alg {:?} is not EdDSA", algorithm)));
            }
            let x = jwk.x.as_deref().ok_or_else(|| invalid("missing x".to_string()))?;
            let key = DecodingKey::from_ed_components(x).map_err(|e| invalid(e.to_string()))?;
            (algorithm, key)
        }
        other => {
            tracing::warn!(target: "authz.auth.jwks", kid = %jwk.kid, kty = %other, "Skipping unsupported key type");
            return Ok(None);
        }
    };

    Ok(Some(SigningKey {
        key_id: jwk.kid.clone(),
        algorithm,
        decoding_key,
    }))
}
