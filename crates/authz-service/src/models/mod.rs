//! Authorizer wire models.
//!
//! The request mirrors the event an API gateway hands to a request
//! authorizer; the response is the decision shape it expects back.

use crate::policy::model::PolicyDocument;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Authorization request event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerRequest {
    /// Event type, e.g. `REQUEST`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// ARN of the method being invoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_arn: Option<String>,

    /// Request headers. May be null in the incoming event.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: HashMap<String, String>,
}

impl AuthorizerRequest {
    pub fn with_headers(headers: HashMap<String, String>) -> Self {
        Self {
            event_type: Some("REQUEST".to_string()),
            method_arn: None,
            headers,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decision returned for every request, allow or deny.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub principal_id: String,

    pub policy_document: PolicyDocument,

    /// Empty on deny.
    pub context: BTreeMap<String, String>,

    pub usage_identifier_key: String,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_keys: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_store: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}
