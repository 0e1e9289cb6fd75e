//! Bearer credential extraction from request headers.

use crate::errors::ExtractionError;
use std::collections::HashMap;

/// Header carrying the bearer credential. Matched exactly first, then
/// case-insensitively.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Pull the raw token out of `Authorization: Bearer <token>`.
///
/// The header value must split on single spaces into exactly two
/// components and the scheme must be the literal `Bearer`. The token is
/// returned verbatim; an empty token is left for the validator to reject.
pub fn extract_bearer_token(headers: &HashMap<String, String>) -> Result<&str, ExtractionError> {
    let value = authorization_value(headers).ok_or_else(|| {
        tracing::debug!(target: "authz.auth.extractor", "Missing Authorization header");
        ExtractionError::MissingHeader
    })?;

    let components: Vec<&str> = value.split(' ').collect();
    let [scheme, token] = components.as_slice() else {
        tracing::debug!(
            target: "authz.auth.extractor",
            components = components.len(),
            "Malformed Authorization header"
        );
        return Err(ExtractionError::MalformedHeader(components.len()));
    };

    if *scheme != "Bearer" {
        tracing::debug!(target: "authz.auth.extractor", "Unsupported Authorization scheme");
        return Err(ExtractionError::UnsupportedScheme);
    }

    Ok(*token)
}

/// The exact `Authorization` header if present, else the case-insensitive
/// match with the lowest name so repeated variants resolve the same way.
fn authorization_value(headers: &HashMap<String, String>) -> Option<&str> {
    if let Some(value) = headers.get(AUTHORIZATION_HEADER) {
        return Some(value.as_str());
    }
    headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION_HEADER))
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, value)| value.as_str())
}
