//! Merge per-group policy records into one document.

use crate::errors::AuthzError;
use crate::policy::model::{PolicyDocument, PolicyRecord};

/// Concatenate the statements of `records` in order.
///
/// The first record's `Version` is used for the merged document. Records
/// are expected to share one policy-language version; a mismatch is logged
/// and otherwise ignored.
///
/// # Errors
///
/// `AuthzError::NoRecords` when `records` is empty.
pub fn aggregate(records: Vec<PolicyRecord>) -> Result<PolicyDocument, AuthzError> {
    let mut records = records.into_iter();
    let first = records.next().ok_or(AuthzError::NoRecords)?;

    let mut merged = first.policy;
    for record in records {
        if record.policy.version != merged.version {
            tracing::debug!(
                target: "authz.policy.aggregator",
                group = %record.group_id,
                version = %record.policy.version,
                using = %merged.version,
                "Policy version differs from first record"
            );
        }
        merged.statements.extend(record.policy.statements);
    }

    tracing::debug!(
        target: "authz.policy.aggregator",
        statements = merged.statements.len(),
        "Policies aggregated"
    );
    Ok(merged)
}
