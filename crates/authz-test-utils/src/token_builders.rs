//! Builder patterns for test data construction
//!
//! Provides fluent APIs for Cognito-shaped claims, signed tokens and
//! authorizer request events.

use crate::crypto_fixtures::TestSigningKey;
use authz_service::models::AuthorizerRequest;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Header};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Builder for Cognito-style access token claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_user("user-1")
///     .for_client("app123")
///     .with_groups(&["admins"])
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    sub: String,
    client_id: Option<String>,
    aud: Option<Value>,
    groups: Option<Vec<String>>,
    username: Option<String>,
    exp: i64,
    iat: Option<i64>,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a new claims builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            client_id: Some("app123".to_string()),
            aud: None,
            groups: None,
            username: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: Some(now.timestamp()),
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the `client_id` claim (access tokens)
    pub fn for_client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    /// Drop `client_id` and set `aud` instead (ID tokens)
    pub fn with_audience(mut self, aud: &str) -> Self {
        self.client_id = None;
        self.aud = Some(json!(aud));
        self
    }

    /// Set `cognito:groups`
    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = Some(groups.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("token_use".to_string(), json!("access"));
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), json!(iat));
        }
        if let Some(client_id) = self.client_id {
            claims.insert("client_id".to_string(), json!(client_id));
        }
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        if let Some(groups) = self.groups {
            claims.insert("cognito:groups".to_string(), json!(groups));
        }
        if let Some(username) = self.username {
            claims.insert("username".to_string(), json!(username));
        }
        Value::Object(claims)
    }

    /// Build and sign with `key`
    pub fn sign(self, key: &TestSigningKey) -> String {
        sign_claims(key, &self.build())
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign `claims` with `key`, putting its kid and algorithm in the header.
pub fn sign_claims(key: &TestSigningKey, claims: &Value) -> String {
    let mut header = Header::new(key.algorithm());
    header.kid = Some(key.kid().to_string());
    encode(&header, claims, key.encoding_key()).expect("test token signing failed")
}

/// Authorizer event carrying `Authorization: Bearer <token>`
pub fn bearer_request(token: &str) -> AuthorizerRequest {
    request_with_authorization(&format!("Bearer {}", token))
}

/// Authorizer event carrying a raw `Authorization` header value
pub fn request_with_authorization(value: &str) -> AuthorizerRequest {
    let mut request = AuthorizerRequest::with_headers(HashMap::from([(
        "Authorization".to_string(),
        value.to_string(),
    )]));
    request.event_type = Some("REQUEST".to_string());
    request.method_arn =
        Some("arn:aws:execute-api:eu-west-1:123456789012:abc123/prod/GET/items".to_string());
    request
}
