//! Scriptable lookup store for resolver and end-to-end tests.
//!
//! Records every batch-get it receives and can be told to hold keys back
//! as unprocessed or to fail outright.

use async_trait::async_trait;
use authz_service::errors::ResolverError;
use authz_service::repositories::{
    BatchGetOutput, BatchGetRequest, LookupStore, StoreItem, MAX_BATCH_GET_KEYS,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory [`LookupStore`] with call recording and fault injection.
///
/// # Example
/// ```rust,ignore
/// let store = MockLookupStore::new()
///     .with_policy("admins", allow_policy("arn:items"))
///     .throttling(1);
/// // First call processes one key per request, later calls process all.
/// ```
#[derive(Default)]
pub struct MockLookupStore {
    items: HashMap<String, Value>,
    throttled_calls: usize,
    failure: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
    call_count: AtomicUsize,
}

impl MockLookupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `policy` under `group`.
    pub fn with_policy(mut self, group: &str, policy: Value) -> Self {
        self.items.insert(group.to_string(), policy);
        self
    }

    /// For the first `calls` batch-gets, process only the first requested
    /// key and report the rest as unprocessed.
    pub fn throttling(mut self, calls: usize) -> Self {
        self.throttled_calls = calls;
        self
    }

    /// Fail every batch-get and ping with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Keys of every batch-get received, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupStore for MockLookupStore {
    async fn batch_get(&self, request: BatchGetRequest<'_>) -> Result<BatchGetOutput, ResolverError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.keys.to_vec());
        }

        if let Some(message) = &self.failure {
            return Err(ResolverError::Store(message.clone()));
        }
        assert!(
            request.keys.len() <= MAX_BATCH_GET_KEYS,
            "batch-get carried {} keys",
            request.keys.len()
        );

        let (processed, unprocessed) = if call < self.throttled_calls {
            request.keys.split_at(request.keys.len().min(1))
        } else {
            (request.keys, &[][..])
        };

        let items = processed
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
            unprocessed_keys: unprocessed.to_vec(),
        })
    }

    async fn ping(&self) -> Result<(), ResolverError> {
        match &self.failure {
            Some(message) => Err(ResolverError::Store(message.clone())),
            None => Ok(()),
        }
    }
}

/// Single-statement Allow policy for `execute-api:Invoke` on `resource`.
pub fn allow_policy(resource: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "execute-api:Invoke",
            "Effect": "Allow",
            "Resource": resource
        }]
    })
}
