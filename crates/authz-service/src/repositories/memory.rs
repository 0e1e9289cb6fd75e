//! In-memory lookup store, loaded from a JSON file of policy items.
//!
//! Items have the same shape as rows in the hosted table:
//!
//! ```json
//! [{"group": "admins", "policy": {"Version": "2012-10-17", "Statement": [...]}}]
//! ```
//!
//! where `group` is the configured partition key field.

use crate::errors::ResolverError;
use crate::repositories::lookup_store::{
    check_request, BatchGetOutput, BatchGetRequest, LookupStore, StoreItem,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::instrument;

/// Policy items held in memory, keyed by partition key value.
#[derive(Debug, Clone)]
pub struct InMemoryLookupStore {
    table: String,
    key_field: String,
    items: HashMap<String, serde_json::Value>,
}

impl InMemoryLookupStore {
    /// Create an empty store serving `table` keyed by `key_field`.
    pub fn new(table: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_field: key_field.into(),
            items: HashMap::new(),
        }
    }

    /// Add or replace the policy for `key`.
    pub fn insert(&mut self, key: impl Into<String>, policy: serde_json::Value) {
        self.items.insert(key.into(), policy);
    }

    #[must_use]
    pub fn with_item(mut self, key: impl Into<String>, policy: serde_json::Value) -> Self {
        self.insert(key, policy);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Build a store from raw table items.
    ///
    /// Each item must carry a string `key_field` and a `policy` value.
    pub fn from_items(
        table: impl Into<String>,
        key_field: impl Into<String>,
        items: Vec<serde_json::Value>,
    ) -> Result<Self, ResolverError> {
        let mut store = Self::new(table, key_field);

        for (position, mut item) in items.into_iter().enumerate() {
            let key = item
                .get(&store.key_field)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ResolverError::MalformedRecord(format!(
                        "item {} has no string '{}' field",
                        position, store.key_field
                    ))
                })?;
            let policy = item
                .get_mut("policy")
                .map(serde_json::Value::take)
                .ok_or_else(|| {
                    ResolverError::MalformedRecord(format!("item '{}' has no policy", key))
                })?;
            store.insert(key, policy);
        }

        Ok(store)
    }

    /// Load items from a JSON file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load_file(
        table: impl Into<String>,
        key_field: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, ResolverError> {
        let contents = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| ResolverError::Store(format!("failed to read policy file: {}", e)))?;

        let items: Vec<serde_json::Value> = serde_json::from_str(&contents)
            .map_err(|e| ResolverError::MalformedRecord(format!("policy file: {}", e)))?;

        let store = Self::from_items(table, key_field, items)?;
        tracing::info!(target: "authz.repo.memory", items = store.len(), "Policy file loaded");
        Ok(store)
    }
}

#[async_trait]
impl LookupStore for InMemoryLookupStore {
    async fn batch_get(&self, request: BatchGetRequest<'_>) -> Result<BatchGetOutput, ResolverError> {
        check_request(&request, &self.table, &self.key_field)?;

        let items = request
            .keys
            .iter()
            .filter_map(|key| {
                self.items.get(key).map(|policy| StoreItem {
                    key: key.clone(),
                    policy: policy.clone(),
                })
            })
            .collect();

        Ok(BatchGetOutput {
            items,
            unprocessed_keys: Vec::new(),
        })
    }

    async fn ping(&self) -> Result<(), ResolverError> {
        Ok(())
    }
}
