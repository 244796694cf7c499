//! Producer version resolution.
//!
//! The version string only stamps provenance (the `_producer` URI on every
//! facet). Failing to resolve it must never fail extraction, so every error
//! path collapses to [`DEFAULT_VERSION`].

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Sentinel used whenever the version cannot be read.
pub const DEFAULT_VERSION: &str = "main";

/// Environment variable naming the version properties file.
pub const VERSION_FILE_ENV: &str = "PLANLINEAGE_VERSION_FILE";

const PRODUCER_URI_BASE: &str = "https://github.com/planlineage/planlineage/tree";

static PRODUCER_URI: OnceLock<String> = OnceLock::new();

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*version\s*[=:]\s*(\S+)\s*$").expect("version pattern is valid")
    })
}

/// Parse the `version` key out of properties-style text.
///
/// Blank lines and `#`/`!` comments are ignored. Returns `None` if no
/// non-empty `version` entry exists.
pub fn parse_version_properties(contents: &str) -> Option<String> {
    contents
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.starts_with('#') && !trimmed.starts_with('!')
        })
        .find_map(|line| version_pattern().captures(line))
        .map(|caps| caps[1].to_string())
}

/// Read the version from a properties file, falling back to [`DEFAULT_VERSION`].
pub fn resolve_version_from<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) => parse_version_properties(&contents).unwrap_or_else(|| {
            tracing::debug!("No version entry in {}, using '{}'", path.display(), DEFAULT_VERSION);
            DEFAULT_VERSION.to_string()
        }),
        Err(e) => {
            tracing::debug!(
                "Cannot read version file {}: {}, using '{}'",
                path.display(),
                e,
                DEFAULT_VERSION
            );
            DEFAULT_VERSION.to_string()
        }
    }
}

/// Resolve the producer version from the file named by [`VERSION_FILE_ENV`].
pub fn resolve_version() -> String {
    match std::env::var(VERSION_FILE_ENV) {
        Ok(path) => resolve_version_from(path),
        Err(_) => DEFAULT_VERSION.to_string(),
    }
}

/// Build the producer URI for a given version.
pub fn producer_uri_for(version: &str) -> String {
    format!("{}/{}/integration/planlineage", PRODUCER_URI_BASE, version)
}

/// Process-wide producer URI, resolved once on first use.
pub fn producer_uri() -> &'static str {
    PRODUCER_URI.get_or_init(|| {
        let uri = producer_uri_for(&resolve_version());
        tracing::info!("Lineage producer: {}", uri);
        uri
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_version_properties() {
        let contents = "# build info\nname=planlineage\nversion=1.4.2\n";
        assert_eq!(parse_version_properties(contents), Some("1.4.2".to_string()));
    }

    #[test]
    fn test_parse_version_ignores_comments() {
        let contents = "#version=0.0.1\n! version=0.0.2\nversion : 2.0.0\n";
        assert_eq!(parse_version_properties(contents), Some("2.0.0".to_string()));
    }

    #[test]
    fn test_parse_version_missing_key() {
        assert_eq!(parse_version_properties("name=planlineage\n"), None);
        assert_eq!(parse_version_properties("version=\n"), None);
    }

    #[test]
    fn test_resolve_version_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version=3.1.0").unwrap();

        assert_eq!(resolve_version_from(file.path()), "3.1.0");
    }

    #[test]
    fn test_resolve_version_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("version.properties");

        assert_eq!(resolve_version_from(&missing), DEFAULT_VERSION);
    }

    #[test]
    fn test_resolve_version_without_key_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "build=42").unwrap();

        assert_eq!(resolve_version_from(file.path()), DEFAULT_VERSION);
    }

    #[test]
    fn test_producer_uri_format() {
        assert_eq!(
            producer_uri_for("main"),
            "https://github.com/planlineage/planlineage/tree/main/integration/planlineage"
        );
    }

    #[test]
    fn test_producer_uri_is_stable() {
        assert_eq!(producer_uri(), producer_uri());
    }
}
