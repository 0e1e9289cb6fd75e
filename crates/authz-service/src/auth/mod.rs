//! Bearer credential handling: header extraction, signing key cache and
//! token validation.

pub mod claims;
pub mod extractor;
pub mod jwks;
pub mod jwt;

pub use claims::Claims;
pub use extractor::extract_bearer_token;
pub use jwks::{KeyCache, KeySet, SigningKey};
pub use jwt::{validate_token, TokenValidator};
