//! Verified token claims.
//!
//! Claims are only ever constructed from a payload whose signature has
//! already been verified. The `sub` and `username` fields are redacted in
//! Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `aud` may be a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims carried by an identity-provider token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// App client the token was issued to (access tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Audience (id tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Group memberships used to look up policy records.
    #[serde(
        rename = "cognito:groups",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub groups: Vec<String>,

    /// Username - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// `access` or `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,

    /// Every other claim, kept opaque.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("client_id", &self.client_id)
            .field("aud", &self.aud)
            .field("groups", &self.groups)
            .field("username", &self.username.as_ref().map(|_| "[REDACTED]"))
            .field("token_use", &self.token_use)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl Claims {
    /// Whether the token was issued for `expected`.
    ///
    /// `client_id` is authoritative when present; otherwise `aud` must name
    /// the expected client. A token carrying neither never matches.
    pub fn audience_matches(&self, expected: &str) -> bool {
        match (&self.client_id, &self.aud) {
            (Some(client_id), _) => client_id == expected,
            (None, Some(aud)) => aud.contains(expected),
            (None, None) => false,
        }
    }

    /// Whether the token is past its expiry at `now`. Valid at exactly `exp`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.exp
    }
}
