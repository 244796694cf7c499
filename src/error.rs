//! Error types for extraction, enrichment and configuration.
//!
//! None of these reach the caller of the dispatcher: extraction and
//! resolver errors are logged and swallowed at the dispatch boundary.
//! Only configuration loading surfaces errors to its caller.

use std::path::PathBuf;

/// Error raised by an extractor for a single plan node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    #[error("malformed {kind} node: {reason}")]
    MalformedNode { kind: String, reason: String },

    #[error("property '{property}' has unexpected shape: {reason}")]
    InvalidProperty { property: String, reason: String },

    #[error("delegate '{delegate}' failed: {reason}")]
    DelegateFailed { delegate: String, reason: String },
}

/// Error raised by a version resolver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("lookup failed: {0}")]
    LookupFailed(String),

    #[error("resolver '{resolver}' timed out after {timeout_ms}ms")]
    TimedOut { resolver: String, timeout_ms: u64 },

    #[error("resolver '{resolver}' panicked")]
    Panicked { resolver: String },
}

/// Error raised while loading or validating a [`LineageConfig`](crate::runtime::LineageConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_display() {
        let err = ExtractError::MalformedNode {
            kind: "ScanRelation".to_string(),
            reason: "missing relation".to_string(),
        };
        assert_eq!(err.to_string(), "malformed ScanRelation node: missing relation");
    }

    #[test]
    fn test_resolve_error_display() {
        let err = ResolveError::TimedOut {
            resolver: "catalog".to_string(),
            timeout_ms: 50,
        };
        assert_eq!(err.to_string(), "resolver 'catalog' timed out after 50ms");
    }
}
