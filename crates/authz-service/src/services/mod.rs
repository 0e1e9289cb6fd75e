//! Service layer.
//!
//! - `policy_resolver` - group policy lookup over the batch-get protocol
//! - `authorizer` - the full request decision

pub mod authorizer;
pub mod policy_resolver;

pub use authorizer::{Authorizer, DecisionSettings};
pub use policy_resolver::{PolicyResolver, RetryPolicy};
