//! Request authorizer: extractor, validator, resolver and aggregator
//! chained into one ALLOW / DENY decision.
//!
//! Every failure becomes the same deny response. The cause is logged once
//! here, with a decision id for correlation, and counted by kind.

use crate::auth::extractor::extract_bearer_token;
use crate::auth::jwks::KeyCache;
use crate::auth::jwt::TokenValidator;
use crate::config::Config;
use crate::errors::AuthzError;
use crate::models::{AuthorizerRequest, AuthorizerResponse};
use crate::observability::metrics;
use crate::policy::aggregator::aggregate;
use crate::policy::decision::{allow_context, build_allow, build_deny, Decision};
use crate::repositories::LookupStore;
use crate::services::policy_resolver::{PolicyResolver, RetryPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

/// Response settings shared by every decision.
#[derive(Debug, Clone)]
pub struct DecisionSettings {
    /// Principal placed in every deny.
    pub deny_principal_id: String,

    /// Opaque value echoed in every response.
    pub usage_identifier_key: String,

    /// Upper bound on one decision, including store calls.
    pub request_timeout: Duration,
}

pub struct Authorizer {
    validator: TokenValidator,
    resolver: PolicyResolver,
    settings: DecisionSettings,
}

impl Authorizer {
    pub fn new(validator: TokenValidator, resolver: PolicyResolver, settings: DecisionSettings) -> Self {
        Self {
            validator,
            resolver,
            settings,
        }
    }

    /// Wire an authorizer from service configuration.
    pub fn from_config(config: &Config, key_cache: Arc<KeyCache>, store: Arc<dyn LookupStore>) -> Self {
        let validator = TokenValidator::new(key_cache, config.app_client_id.clone(), config.clock_skew());
        let resolver = PolicyResolver::new(
            store,
            config.table_name.clone(),
            config.partition_key.clone(),
            RetryPolicy {
                max_retries: config.batch_get_max_retries,
                initial_backoff: Duration::from_millis(config.batch_get_backoff_ms),
            },
        );
        Self::new(
            validator,
            resolver,
            DecisionSettings {
                deny_principal_id: config.deny_principal_id.clone(),
                usage_identifier_key: config.usage_identifier_key.clone(),
                request_timeout: config.request_timeout(),
            },
        )
    }

    /// Decide on `request` now.
    pub async fn authorize(&self, request: &AuthorizerRequest) -> AuthorizerResponse {
        self.authorize_at(request, chrono::Utc::now().timestamp()).await
    }

    /// Decide on `request` as of `now` (Unix seconds). Never fails: every
    /// error path yields the uniform deny.
    #[instrument(skip_all, name = "authz.authorize", fields(decision_id = tracing::field::Empty))]
    pub async fn authorize_at(&self, request: &AuthorizerRequest, now: i64) -> AuthorizerResponse {
        let decision_id = Uuid::new_v4();
        tracing::Span::current().record("decision_id", tracing::field::display(decision_id));
        let start = Instant::now();

        let outcome = tokio::time::timeout(self.settings.request_timeout, self.decide(request, now))
            .await
            .unwrap_or(Err(AuthzError::Timeout));

        let decision = match outcome {
            Ok(decision) => {
                tracing::info!(
                    target: "authz.service",
                    decision_id = %decision_id,
                    method_arn = request.method_arn.as_deref().unwrap_or(""),
                    "Request allowed"
                );
                metrics::record_decision(decision.label(), "granted", start.elapsed());
                decision
            }
            Err(e) => {
                tracing::info!(
                    target: "authz.service",
                    decision_id = %decision_id,
                    method_arn = request.method_arn.as_deref().unwrap_or(""),
                    error_kind = e.kind(),
                    error = %e,
                    "Request denied"
                );
                let decision = build_deny(self.settings.deny_principal_id.clone());
                metrics::record_decision(decision.label(), e.kind(), start.elapsed());
                decision
            }
        };

        decision.into_response(&self.settings.usage_identifier_key)
    }

    async fn decide(&self, request: &AuthorizerRequest, now: i64) -> Result<Decision, AuthzError> {
        let token = extract_bearer_token(&request.headers)?;
        let claims = self.validator.validate(token, now)?;
        let records = self.resolver.resolve(&claims.groups).await?;
        let policy = aggregate(records)?;

        Ok(build_allow(claims.sub.clone(), policy, allow_context(&claims)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::auth::testing::TestKeypair;
    use crate::errors::ResolverError;
    use crate::policy::decision::{deny_policy, DENY_RESOURCE};
    use crate::policy::model::Effect;
    use crate::repositories::lookup_store::{BatchGetOutput, BatchGetRequest};
    use crate::repositories::InMemoryLookupStore;
    use async_trait::async_trait;
    use common::jwt::DEFAULT_CLOCK_SKEW;
    use serde_json::json;
    use std::collections::HashMap;

    const NOW: i64 = 1_700_000_000;

    fn key_cache(keypair: &TestKeypair) -> Arc<KeyCache> {
        Arc::new(
            KeyCache::from_jwks(
                "http://localhost/jwks.json",
                serde_json::from_value(json!({ "keys": [keypair.jwk()] })).unwrap(),
            )
            .unwrap(),
        )
    }

    fn admins_store() -> InMemoryLookupStore {
        InMemoryLookupStore::new("group_policies", "group").with_item(
            "admins",
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": "execute-api:Invoke",
                    "Effect": "Allow",
                    "Resource": "arn:aws:execute-api:eu-west-1:123456789012:abc/prod/GET/items"
                }]
            }),
        )
    }

    fn authorizer_with(
        keypair: &TestKeypair,
        store: Arc<dyn LookupStore>,
        timeout: Duration,
    ) -> Authorizer {
        Authorizer::new(
            TokenValidator::new(key_cache(keypair), "app123".to_string(), DEFAULT_CLOCK_SKEW),
            PolicyResolver::new(
                store,
                "group_policies",
                "group",
                RetryPolicy {
                    max_retries: 1,
                    initial_backoff: Duration::from_millis(1),
                },
            ),
            DecisionSettings {
                deny_principal_id: "anonymous".to_string(),
                usage_identifier_key: "usage-key".to_string(),
                request_timeout: timeout,
            },
        )
    }

    fn request_with_token(token: &str) -> AuthorizerRequest {
        AuthorizerRequest::with_headers(HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {}", token),
        )]))
    }

    fn claims(groups: &[&str]) -> serde_json::Value {
        json!({
            "sub": "user-1",
            "exp": NOW + 3600,
            "iat": NOW,
            "client_id": "app123",
            "cognito:groups": groups,
            "username": "alice"
        })
    }

    fn assert_uniform_deny(response: &AuthorizerResponse) {
        assert_eq!(response.principal_id, "anonymous");
        assert_eq!(response.policy_document, deny_policy());
        assert!(response.context.is_empty());
        assert_eq!(response.usage_identifier_key, "usage-key");
    }

    #[tokio::test]
    async fn test_allow_for_matching_group() {
        let keypair = TestKeypair::new("key-1");
        let authorizer = authorizer_with(&keypair, Arc::new(admins_store()), Duration::from_secs(3));

        let response = authorizer
            .authorize_at(&request_with_token(&keypair.sign(&claims(&["admins"]))), NOW)
            .await;

        assert_eq!(response.principal_id, "user-1");
        assert_eq!(response.policy_document.statements.len(), 1);
        assert_eq!(response.policy_document.statements[0].effect, Effect::Allow);
        assert_eq!(response.context.get("groups").unwrap(), "admins");
        assert_eq!(response.usage_identifier_key, "usage-key");
    }

    #[tokio::test]
    async fn test_missing_header_denies() {
        let keypair = TestKeypair::new("key-1");
        let authorizer = authorizer_with(&keypair, Arc::new(admins_store()), Duration::from_secs(3));

        let response = authorizer
            .authorize_at(&AuthorizerRequest::default(), NOW)
            .await;

        assert_uniform_deny(&response);
        assert!(matches!(
            response.policy_document.statements[0].resource,
            Some(crate::policy::model::OneOrMany::One(ref r)) if r == DENY_RESOURCE
        ));
    }

    #[tokio::test]
    async fn test_no_matching_records_denies() {
        let keypair = TestKeypair::new("key-1");
        let authorizer = authorizer_with(&keypair, Arc::new(admins_store()), Duration::from_secs(3));

        let response = authorizer
            .authorize_at(&request_with_token(&keypair.sign(&claims(&["guests"]))), NOW)
            .await;

        assert_uniform_deny(&response);
    }

    #[tokio::test]
    async fn test_expired_token_deny_matches_other_denies() {
        let keypair = TestKeypair::new("key-1");
        let authorizer = authorizer_with(&keypair, Arc::new(admins_store()), Duration::from_secs(3));

        let expired = authorizer
            .authorize_at(
                &request_with_token(&keypair.sign(&claims(&["admins"]))),
                NOW + 7200,
            )
            .await;
        let garbage = authorizer
            .authorize_at(&request_with_token("not-a-token"), NOW)
            .await;

        assert_uniform_deny(&expired);
        assert_eq!(expired, garbage);
    }

    #[tokio::test]
    async fn test_decisions_are_counted_by_outcome() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let keypair = TestKeypair::new("key-1");
        let authorizer = authorizer_with(&keypair, Arc::new(admins_store()), Duration::from_secs(3));
        authorizer
            .authorize_at(&request_with_token(&keypair.sign(&claims(&["admins"]))), NOW)
            .await;
        authorizer
            .authorize_at(&AuthorizerRequest::default(), NOW)
            .await;

        let mut outcomes: Vec<(String, String)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, value)| {
                key.key().name() == "authz_decisions_total" && *value == DebugValue::Counter(1)
            })
            .map(|(key, _, _, _)| {
                let label = |name: &str| {
                    key.key()
                        .labels()
                        .find(|l| l.key() == name)
                        .map(|l| l.value().to_string())
                        .unwrap()
                };
                (label("decision"), label("reason"))
            })
            .collect();
        outcomes.sort();

        assert_eq!(
            outcomes,
            vec![
                ("allow".to_string(), "granted".to_string()),
                ("deny".to_string(), "missing_header".to_string()),
            ]
        );
    }

    struct SlowStore;

    #[async_trait]
    impl LookupStore for SlowStore {
        async fn batch_get(&self, _: BatchGetRequest<'_>) -> Result<BatchGetOutput, ResolverError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(BatchGetOutput::default())
        }

        async fn ping(&self) -> Result<(), ResolverError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_denies() {
        let keypair = TestKeypair::new("key-1");
        let authorizer = authorizer_with(&keypair, Arc::new(SlowStore), Duration::from_millis(100));

        let response = authorizer
            .authorize_at(&request_with_token(&keypair.sign(&claims(&["admins"]))), NOW)
            .await;

        assert_uniform_deny(&response);
    }
}
