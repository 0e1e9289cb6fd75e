//! Lookup store abstraction for per-group policy records.
//!
//! The store speaks a batch-get protocol: one call names a table, the
//! partition key field and at most [`MAX_BATCH_GET_KEYS`] key values, and
//! returns the matching items plus any keys it could not process this time.

use crate::errors::ResolverError;
use async_trait::async_trait;

/// Maximum number of keys a single batch-get may carry.
pub const MAX_BATCH_GET_KEYS: usize = 25;

/// One batch-get call.
#[derive(Debug, Clone, Copy)]
pub struct BatchGetRequest<'a> {
    pub table: &'a str,
    pub key_field: &'a str,
    pub keys: &'a [String],
}

/// A raw stored item: the partition key value and its undecoded policy.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
    pub key: String,
    pub policy: serde_json::Value,
}

/// Result of one batch-get call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Items found, in the order the store returned them.
    pub items: Vec<StoreItem>,

    /// Requested keys the store did not process and that should be retried.
    pub unprocessed_keys: Vec<String>,
}

/// Backend able to serve policy batch-gets.
#[async_trait]
pub trait LookupStore: Send + Sync {
    /// Fetch the items for `request.keys`. Keys with no item are simply absent.
    async fn batch_get(&self, request: BatchGetRequest<'_>) -> Result<BatchGetOutput, ResolverError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), ResolverError>;
}

/// Reject requests a store was not configured to serve.
pub(crate) fn check_request(
    request: &BatchGetRequest<'_>,
    table: &str,
    key_field: &str,
) -> Result<(), ResolverError> {
    if request.table != table || request.key_field != key_field {
        return Err(ResolverError::Store(format!(
            "store serves {}.{}, not {}.{}",
            table, key_field, request.table, request.key_field
        )));
    }
    if request.keys.len() > MAX_BATCH_GET_KEYS {
        return Err(ResolverError::Store(format!(
            "batch-get carries {} keys, limit is {}",
            request.keys.len(),
            MAX_BATCH_GET_KEYS
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_check_request_accepts_configured_table() {
        let keys = vec!["admins".to_string()];
        let request = BatchGetRequest {
            table: "group_policies",
            key_field: "group",
            keys: &keys,
        };
        assert!(check_request(&request, "group_policies", "group").is_ok());
    }

    #[test]
    fn test_check_request_rejects_other_table_or_field() {
        let keys = vec!["admins".to_string()];
        let request = BatchGetRequest {
            table: "other",
            key_field: "group",
            keys: &keys,
        };
        assert!(matches!(
            check_request(&request, "group_policies", "group"),
            Err(ResolverError::Store(_))
        ));

        let request = BatchGetRequest {
            table: "group_policies",
            key_field: "id",
            keys: &keys,
        };
        assert!(check_request(&request, "group_policies", "group").is_err());
    }

    #[test]
    fn test_check_request_enforces_page_size() {
        let keys: Vec<String> = (0..=MAX_BATCH_GET_KEYS).map(|i| format!("g{}", i)).collect();
        let request = BatchGetRequest {
            table: "t",
            key_field: "k",
            keys: &keys,
        };
        assert!(check_request(&request, "t", "k").is_err());

        let request = BatchGetRequest {
            keys: &keys[..MAX_BATCH_GET_KEYS],
            ..request
        };
        assert!(check_request(&request, "t", "k").is_ok());
    }
}
