//! Policy documents, aggregation and decisions.

pub mod aggregator;
pub mod decision;
pub mod model;

pub use aggregator::aggregate;
pub use decision::{build_allow, build_deny, deny_policy, Decision};
pub use model::{Effect, OneOrMany, PolicyDocument, PolicyRecord, Statement};
