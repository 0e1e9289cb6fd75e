//! Final ALLOW / DENY decisions and their response shape.
//!
//! Every deny is identical regardless of cause: the configured principal,
//! one wildcard deny statement and an empty context.

use crate::auth::claims::Claims;
use crate::models::AuthorizerResponse;
use crate::policy::model::{Effect, PolicyDocument, Statement};
use std::collections::BTreeMap;

/// Policy language version of the fixed deny document.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Action denied on every deny.
pub const DENY_ACTION: &str = "execute-api:Invoke";

/// Resource denied on every deny: every API, stage, method and path.
pub const DENY_RESOURCE: &str = "arn:aws:execute-api:*:*:*/ANY/*";

/// Outcome of one authorization request.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow {
        principal_id: String,
        policy: PolicyDocument,
        context: BTreeMap<String, String>,
    },
    Deny {
        principal_id: String,
    },
}

pub fn build_allow(
    principal_id: impl Into<String>,
    policy: PolicyDocument,
    context: BTreeMap<String, String>,
) -> Decision {
    Decision::Allow {
        principal_id: principal_id.into(),
        policy,
        context,
    }
}

pub fn build_deny(principal_id: impl Into<String>) -> Decision {
    Decision::Deny {
        principal_id: principal_id.into(),
    }
}

/// The maximally restrictive deny document.
pub fn deny_policy() -> PolicyDocument {
    PolicyDocument {
        version: POLICY_VERSION.to_string(),
        statements: vec![Statement::new(DENY_ACTION, Effect::Deny, DENY_RESOURCE)],
    }
}

/// Context passed downstream on allow.
pub fn allow_context(claims: &Claims) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    context.insert("sub".to_string(), claims.sub.clone());
    context.insert("groups".to_string(), claims.groups.join(","));
    if let Some(username) = &claims.username {
        context.insert("username".to_string(), username.clone());
    }
    context
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        if self.is_allow() {
            "allow"
        } else {
            "deny"
        }
    }

    pub fn into_response(self, usage_identifier_key: &str) -> AuthorizerResponse {
        let usage_identifier_key = usage_identifier_key.to_string();
        match self {
            Decision::Allow {
                principal_id,
                policy,
                context,
            } => AuthorizerResponse {
                principal_id,
                policy_document: policy,
                context,
                usage_identifier_key,
            },
            Decision::Deny { principal_id } => AuthorizerResponse {
                principal_id,
                policy_document: deny_policy(),
                context: BTreeMap::new(),
                usage_identifier_key,
            },
        }
    }
}
