//! Group policy resolution over the lookup store's batch-get protocol.
//!
//! Groups are de-duplicated, split into pages of at most
//! [`MAX_BATCH_GET_KEYS`], and fetched page by page. When the store reports
//! some keys of a page as unprocessed, only those keys are re-requested,
//! with exponential backoff, up to a fixed number of retries. Keys still
//! unprocessed after the last retry fail the whole resolution.

use crate::errors::ResolverError;
use crate::observability::metrics;
use crate::policy::model::{PolicyDocument, PolicyRecord};
use crate::repositories::lookup_store::{
    BatchGetRequest, LookupStore, StoreItem, MAX_BATCH_GET_KEYS,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Bounded retry schedule for unprocessed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed per page after the first attempt.
    pub max_retries: u32,

    /// Sleep before the first retry; doubled for each later one.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based), capped at [`MAX_BACKOFF`].
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

/// Resolves claimed groups to their stored policy records.
pub struct PolicyResolver {
    store: Arc<dyn LookupStore>,
    table: String,
    key_field: String,
    retry: RetryPolicy,
}

impl PolicyResolver {
    pub fn new(
        store: Arc<dyn LookupStore>,
        table: impl Into<String>,
        key_field: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            key_field: key_field.into(),
            retry,
        }
    }

    /// Fetch the policy records for `groups`.
    ///
    /// Records come back page by page, in the order the store returned them
    /// within each page. Groups without a record are simply absent.
    ///
    /// # Errors
    ///
    /// - `Store` if any batch-get fails
    /// - `MalformedRecord` if a stored policy does not decode
    /// - `UnprocessedKeysExhausted` if the retry budget runs out
    #[instrument(skip_all, name = "authz.policy.resolve", fields(groups = groups.len()))]
    pub async fn resolve(&self, groups: &[String]) -> Result<Vec<PolicyRecord>, ResolverError> {
        let unique = dedup_preserving_order(groups);
        if unique.is_empty() {
            tracing::debug!(target: "authz.policy.resolver", "No groups claimed, skipping lookup");
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for (page, chunk) in unique.chunks(MAX_BATCH_GET_KEYS).enumerate() {
            let items = self.fetch_page(page, chunk).await?;
            for item in items {
                records.push(decode_record(item)?);
            }
        }

        tracing::debug!(
            target: "authz.policy.resolver",
            requested = unique.len(),
            found = records.len(),
            "Group policies resolved"
        );
        Ok(records)
    }

    /// Fetch one page, retrying only the keys the store left unprocessed.
    async fn fetch_page(&self, page: usize, chunk: &[String]) -> Result<Vec<StoreItem>, ResolverError> {
        let mut items = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut pending: Vec<String> = chunk.to_vec();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let start = Instant::now();
            let output = self
                .store
                .batch_get(BatchGetRequest {
                    table: &self.table,
                    key_field: &self.key_field,
                    keys: &pending,
                })
                .await
                .map_err(|e| {
                    metrics::record_batch_get("error", start.elapsed());
                    tracing::warn!(
                        target: "authz.policy.resolver",
                        page = page,
                        attempt = attempt,
                        error = %e,
                        "Batch-get failed"
                    );
                    e
                })?;

            for item in output.items {
                if seen.insert(item.key.clone()) {
                    items.push(item);
                }
            }

            // Keys outside this page are never re-requested
            let reported: Vec<String> = output
                .unprocessed_keys
                .into_iter()
                .filter(|key| chunk.contains(key) && !seen.contains(key))
                .collect();
            let unprocessed = dedup_preserving_order(&reported);

            if unprocessed.is_empty() {
                metrics::record_batch_get("success", start.elapsed());
                return Ok(items);
            }
            metrics::record_batch_get("unprocessed", start.elapsed());

            // The next call is retry number `attempt`
            let retry = attempt;
            if retry > self.retry.max_retries {
                tracing::warn!(
                    target: "authz.policy.resolver",
                    page = page,
                    remaining = unprocessed.len(),
                    attempts = attempt,
                    "Unprocessed keys remain after retry budget"
                );
                return Err(ResolverError::UnprocessedKeysExhausted {
                    remaining: unprocessed.len(),
                    attempts: attempt,
                });
            }

            let backoff = self.retry.backoff(retry);
            tracing::debug!(
                target: "authz.policy.resolver",
                page = page,
                unprocessed = unprocessed.len(),
                retry = retry,
                backoff_ms = backoff.as_millis() as u64,
                "Retrying unprocessed keys"
            );
            metrics::record_unprocessed_retry();
            tokio::time::sleep(backoff).await;
            pending = unprocessed;
        }
    }
}

fn dedup_preserving_order(groups: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    groups
        .iter()
        .filter(|group| seen.insert(group.as_str()))
        .cloned()
        .collect()
}

fn decode_record(item: StoreItem) -> Result<PolicyRecord, ResolverError> {
    let policy: PolicyDocument = serde_json::from_value(item.policy).map_err(|e| {
        tracing::warn!(
            target: "authz.policy.resolver",
            group = %item.key,
            error = %e,
            "Stored policy does not decode"
        );
        ResolverError::MalformedRecord(item.key.clone())
    })?;

    Ok(PolicyRecord {
        group_id: item.key,
        policy,
    })
}
