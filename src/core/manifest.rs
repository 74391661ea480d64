//! Publish manifest types
//!
//! The manifest is the declarative input contract of the batch publisher:
//! an ordered list of entries (package + version + ancillary files +
//! publisher options) plus run-level settings (repository parent root,
//! token environment variable, shared context, publisher factory id).
//!
//! Manifests load from JSON, YAML or TOML, dispatched on file extension.

use crate::core::error::PublishError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Publisher options attached to a manifest entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManifestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_text: Option<String>,

    /// Runtime dependency specifiers forwarded to the publisher
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Distribution name override (defaults to the package id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi_name: Option<String>,

    /// Ancillary allowlist file references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancillary_allowlist: Vec<String>,

    /// Alternate spelling of `ancillary_allowlist`, merged during
    /// option-to-kwarg translation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancillary_list: Vec<String>,

    /// Free-form publisher kwargs, merged last (last-write-wins)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single manifest entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    /// Package identifier (repository subdirectory name)
    pub package: String,

    /// Version string to publish
    pub version: String,

    /// Ancillary file names or `@allowlist` references
    #[serde(default)]
    pub ancillary: Vec<String>,

    #[serde(default)]
    pub options: ManifestOptions,
}

impl ManifestEntry {
    /// Distribution name for this entry (option override or package id)
    pub fn distribution_name(&self) -> &str {
        self.options.pypi_name.as_deref().unwrap_or(&self.package)
    }
}

/// Top-level publish manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishManifest {
    /// Ordered publish entries (the run processes them strictly in order)
    pub entries: Vec<ManifestEntry>,

    /// Directory under which per-package subdirectories live
    pub repo_parent_root: String,

    /// Environment variable holding the upload token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Shared context forwarded to the publisher factory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,

    /// Publisher factory identifier (e.g. "twine")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_factory: Option<String>,
}

impl PublishManifest {
    /// Load a manifest from a JSON, YAML or TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Manifest file path; the extension selects the parser
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, PublishError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path)
                .await
                .map_err(|e| PublishError::ManifestLoad {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, PublishError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let parsed = match extension.as_str() {
            "json" => serde_json::from_str(content).map_err(|e| e.to_string()),
            "yml" | "yaml" => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            "toml" => toml::from_str(content).map_err(|e| e.to_string()),
            other => Err(format!("unsupported manifest extension: {:?}", other)),
        };

        parsed.map_err(|message| PublishError::ManifestLoad {
            path: path.to_path_buf(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_json_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_manifest(
            &temp_dir,
            "manifest.json",
            r#"{
                "entries": [
                    {
                        "package": "demo_pkg",
                        "version": "1.2.3",
                        "ancillary": ["README.md"],
                        "options": {"author": "Author", "dependencies": ["requests>=2"]}
                    }
                ],
                "repo_parent_root": "/repos",
                "token_env": "CUSTOM_ENV"
            }"#,
        );

        let manifest = PublishManifest::load(&path).await.unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].package, "demo_pkg");
        assert_eq!(manifest.entries[0].options.author.as_deref(), Some("Author"));
        assert_eq!(manifest.token_env.as_deref(), Some("CUSTOM_ENV"));
    }

    #[tokio::test]
    async fn test_load_yaml_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_manifest(
            &temp_dir,
            "manifest.yml",
            concat!(
                "entries:\n",
                "  - package: demo_pkg\n",
                "    version: 1.2.3\n",
                "repo_parent_root: /repos\n",
            ),
        );

        let manifest = PublishManifest::load(&path).await.unwrap();
        assert_eq!(manifest.entries[0].version, "1.2.3");
        assert!(manifest.entries[0].ancillary.is_empty());
    }

    #[tokio::test]
    async fn test_load_toml_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_manifest(
            &temp_dir,
            "manifest.toml",
            concat!(
                "repo_parent_root = \"/repos\"\n",
                "\n",
                "[[entries]]\n",
                "package = \"demo_pkg\"\n",
                "version = \"1.2.3\"\n",
                "ancillary = [\"README.md\"]\n",
            ),
        );

        let manifest = PublishManifest::load(&path).await.unwrap();
        assert_eq!(manifest.entries[0].ancillary, vec!["README.md"]);
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_manifest(&temp_dir, "manifest.ini", "entries=");

        let result = PublishManifest::load(&path).await;
        assert!(matches!(result, Err(PublishError::ManifestLoad { .. })));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = PublishManifest::load(temp_dir.path().join("nope.json")).await;
        assert!(matches!(result, Err(PublishError::ManifestLoad { .. })));
    }

    #[test]
    fn test_distribution_name_defaults_to_package() {
        let entry = ManifestEntry {
            package: "demo_pkg".to_string(),
            version: "1.2.3".to_string(),
            ancillary: Vec::new(),
            options: ManifestOptions::default(),
        };
        assert_eq!(entry.distribution_name(), "demo_pkg");
    }

    #[test]
    fn test_distribution_name_honors_override() {
        let entry = ManifestEntry {
            package: "demo_pkg".to_string(),
            version: "1.2.3".to_string(),
            ancillary: Vec::new(),
            options: ManifestOptions {
                pypi_name: Some("demo-pkg".to_string()),
                ..ManifestOptions::default()
            },
        };
        assert_eq!(entry.distribution_name(), "demo-pkg");
    }
}
