//! Manifest Validator - Validates publish manifests before a run
//!
//! Checks the input contract of the batch publisher: non-empty entry list,
//! required fields per entry, and a plausible repository parent root.
//! Suspicious but workable input (duplicate package ids, odd version
//! strings) produces warnings instead of errors.
//!
//! # Example
//!
//! ```no_run
//! use pypi_batch_publisher::validation::manifest_validator::ManifestValidator;
//! use pypi_batch_publisher::core::manifest::PublishManifest;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manifest = PublishManifest::load("manifest.json").await?;
//! let result = ManifestValidator::new().validate(&manifest);
//!
//! if result.is_valid {
//!     println!("Manifest is valid!");
//! }
//! # Ok(())
//! # }
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::manifest::PublishManifest;

lazy_static! {
    /// Release-looking versions: dotted digits, optional pre/post suffix
    static ref VERSION_PATTERN: Regex =
        Regex::new(r"^\d+(\.\d+)*([a-zA-Z][a-zA-Z0-9]*\d*)?(\.(post|dev)\d+)?$")
            .expect("valid version pattern");
}

/// Result of manifest validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the manifest is valid
    pub is_valid: bool,
    /// List of validation errors
    pub errors: Vec<String>,
    /// List of validation warnings
    pub warnings: Vec<String>,
}

/// Validator for publish manifests
pub struct ManifestValidator;

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a loaded manifest
    pub fn validate(&self, manifest: &PublishManifest) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if manifest.entries.is_empty() {
            errors.push("entries が空です".to_string());
        }
        if manifest.repo_parent_root.trim().is_empty() {
            errors.push("repo_parent_root は必須です".to_string());
        }

        let mut seen_packages = HashSet::new();
        for (index, entry) in manifest.entries.iter().enumerate() {
            let label = if entry.package.trim().is_empty() {
                format!("entries[{}]", index)
            } else {
                format!("entries[{}] ({})", index, entry.package)
            };

            if entry.package.trim().is_empty() {
                errors.push(format!("{}: package は必須です", label));
            } else if !seen_packages.insert(entry.package.clone()) {
                warnings.push(format!("{}: package が重複しています", label));
            }

            if entry.version.trim().is_empty() {
                errors.push(format!("{}: version は必須です", label));
            } else if !VERSION_PATTERN.is_match(entry.version.trim()) {
                warnings.push(format!(
                    "{}: version がリリース形式に見えません: {}",
                    label, entry.version
                ));
            }

            for (anc_index, name) in entry.ancillary.iter().enumerate() {
                if name.trim().is_empty() {
                    errors.push(format!(
                        "{}: ancillary[{}] が空です",
                        label, anc_index
                    ));
                }
            }
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{ManifestEntry, ManifestOptions};

    fn manifest_with(entries: Vec<ManifestEntry>) -> PublishManifest {
        PublishManifest {
            entries,
            repo_parent_root: "/repos".to_string(),
            token_env: None,
            context: None,
            publisher_factory: None,
        }
    }

    fn entry(package: &str, version: &str) -> ManifestEntry {
        ManifestEntry {
            package: package.to_string(),
            version: version.to_string(),
            ancillary: Vec::new(),
            options: ManifestOptions::default(),
        }
    }

    #[test]
    fn test_valid_manifest() {
        let manifest = manifest_with(vec![entry("demo_pkg", "1.2.3")]);
        let result = ManifestValidator::new().validate(&manifest);

        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_entries_is_error() {
        let manifest = manifest_with(Vec::new());
        let result = ManifestValidator::new().validate(&manifest);

        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("entries")));
    }

    #[test]
    fn test_missing_fields_are_errors() {
        let mut manifest = manifest_with(vec![entry("", ""), entry("demo_pkg", "1.0.0")]);
        manifest.repo_parent_root = "  ".to_string();
        let result = ManifestValidator::new().validate(&manifest);

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_duplicate_package_is_warning() {
        let manifest = manifest_with(vec![entry("demo_pkg", "1.0.0"), entry("demo_pkg", "1.0.1")]);
        let result = ManifestValidator::new().validate(&manifest);

        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("重複")));
    }

    #[test]
    fn test_odd_version_is_warning() {
        let manifest = manifest_with(vec![entry("demo_pkg", "latest")]);
        let result = ManifestValidator::new().validate(&manifest);

        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_release_like_versions_pass() {
        for version in ["1.0.0", "0.3", "2.0.0rc1", "1.0.0.post2", "1.2.3.dev4"] {
            let manifest = manifest_with(vec![entry("demo_pkg", version)]);
            let result = ManifestValidator::new().validate(&manifest);
            assert!(result.warnings.is_empty(), "{version} flagged");
        }
    }

    #[test]
    fn test_blank_ancillary_is_error() {
        let mut e = entry("demo_pkg", "1.0.0");
        e.ancillary = vec!["README.md".to_string(), "  ".to_string()];
        let result = ManifestValidator::new().validate(&manifest_with(vec![e]));

        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|msg| msg.contains("ancillary")));
    }
}
