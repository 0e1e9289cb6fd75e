//! Common utilities shared across the authorizer crates.

#![warn(clippy::pedantic)]

/// Module for shared configuration types
pub mod config;

/// Module for JWT parsing utilities (size limits, segments, kid, iat)
pub mod jwt;
