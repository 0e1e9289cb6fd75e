//! Policy document types.
//!
//! Field names follow the access-policy language (`Version`, `Statement`,
//! `Action`, `Effect`, `Resource`). Statements are passed through as
//! stored. Only `Effect` is required; `NotAction`, `NotResource`, `Sid`,
//! `Condition` and anything else are kept in `extra`.

use serde::{Deserialize, Serialize};

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One permission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<OneOrMany>,

    #[serde(rename = "Effect")]
    pub effect: Effect,

    #[serde(rename = "Resource", default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,

    /// Every other field, untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Statement {
    pub fn new(action: impl Into<OneOrMany>, effect: Effect, resource: impl Into<OneOrMany>) -> Self {
        Self {
            action: Some(action.into()),
            effect,
            resource: Some(resource.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// A versioned, ordered list of statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,

    #[serde(rename = "Statement")]
    pub statements: Vec<Statement>,
}

/// The policy stored for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRecord {
    pub group_id: String,
    pub policy: PolicyDocument,
}
