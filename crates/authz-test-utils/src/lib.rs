//! # Authorizer Test Utilities
//!
//! Shared test utilities for the authorizer service.
//!
//! This crate provides:
//! - Deterministic signing keys and JWKS documents (`crypto_fixtures`)
//! - Cognito-style claims and request builders (`token_builders`)
//! - A scriptable lookup store (`mock_store`)
//! - Server test harness (`TestAuthzServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authz_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let key = TestSigningKey::ed25519("k1", 1)?;
//!     let store = Arc::new(MockLookupStore::new().with_policy("admins", allow_policy("arn:items")));
//!     let server = TestAuthzServer::spawn(&[&key], store).await?;
//!
//!     let token = TestClaimsBuilder::new().with_groups(&["admins"]).sign(&key);
//!     let response = server.authorize(&bearer_request(&token)).await?;
//!
//!     assert_eq!(response.principal_id, "test-subject");
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_store;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_store::*;
pub use server_harness::*;
pub use token_builders::*;
