//! Shared configuration types for the authorizer crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default `EnvFilter` directive when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "authz=info,common=info,tower_http=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable `fmt` output
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Output format for the fmt layer
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl ObservabilityConfig {
    /// Read `LOG_FORMAT` (`text` | `json`) and `LOG_FILTER` from a variable map.
    ///
    /// Unknown formats fall back to text; logging must never block startup.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let log_format = match vars.get("LOG_FORMAT").map(|s| s.to_ascii_lowercase()) {
            Some(ref s) if s == "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let log_filter = vars
            .get("LOG_FILTER")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            log_filter,
            log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObservabilityConfig::from_vars(&HashMap::new());
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_json_format_case_insensitive() {
        let vars = HashMap::from([("LOG_FORMAT".to_string(), "JSON".to_string())]);
        assert_eq!(
            ObservabilityConfig::from_vars(&vars).log_format,
            LogFormat::Json
        );
    }

    #[test]
    fn test_unknown_format_falls_back_to_text() {
        let vars = HashMap::from([("LOG_FORMAT".to_string(), "xml".to_string())]);
        assert_eq!(
            ObservabilityConfig::from_vars(&vars).log_format,
            LogFormat::Text
        );
    }
}
