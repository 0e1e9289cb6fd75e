//! Request-time authorizer service library.
//!
//! Decides ALLOW or DENY for a request carrying a bearer token and, on
//! ALLOW, returns the access policy aggregated from the caller's groups.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/authorizer.rs
//!                                     -> auth/extractor.rs
//!                                     -> auth/jwt.rs (auth/jwks.rs key cache)
//!                                     -> services/policy_resolver.rs -> repositories/*.rs
//!                                     -> policy/aggregator.rs, policy/decision.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Bearer extraction, signing key cache, token validation
//! - `config` - Service configuration from environment
//! - `errors` - Error taxonomy; every request error maps to DENY
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Authorizer request/response shapes
//! - `observability` - Tracing setup and metrics
//! - `policy` - Policy documents, aggregation and decisions
//! - `repositories` - Lookup store backends
//! - `routes` - Axum router setup
//! - `services` - Policy resolver and authorizer

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod policy;
pub mod repositories;
pub mod routes;
pub mod services;
