//! Manifest entry processing
//!
//! Turns a raw manifest entry into a [`PublishContext`]: the package
//! directory is verified, the main module file is discovered, ancillary
//! names are resolved, and the per-entry options are flattened into a
//! sanitized kwargs map for the publisher factory.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::core::error::PublishError;
use crate::core::manifest::ManifestEntry;
use crate::orchestration::ancillary_resolver::collect_manifest_ancillaries;

/// Keys the orchestrator owns and strips from caller-supplied kwargs
pub const RESERVED_KWARGS: &[&str] = &["dry_run", "cleanup_evidence"];

/// Everything a publisher needs to ship one manifest entry
#[derive(Debug, Clone)]
pub struct PublishContext {
    pub package: String,
    pub version: String,
    pub distribution: String,
    pub pkg_path: PathBuf,
    pub main_file: String,
    pub ancillary_files: Vec<String>,
    pub safe_kwargs: Map<String, Value>,
}

/// Flatten entry options into a publisher kwargs map
///
/// Unset options are omitted entirely; `dependencies` is always present,
/// possibly as an empty list. Both allowlist option spellings
/// merge into a single `ancillary_allowlist` key, first-listed first.
/// Free-form extras land last and may override the structured keys.
pub fn options_to_kwargs(entry: &ManifestEntry) -> Map<String, Value> {
    let mut kwargs = Map::new();
    let options = &entry.options;

    if let Some(author) = &options.author {
        kwargs.insert("author".to_string(), Value::String(author.clone()));
    }
    if let Some(email) = &options.email {
        kwargs.insert("email".to_string(), Value::String(email.clone()));
    }
    if let Some(description) = &options.description {
        kwargs.insert(
            "description".to_string(),
            Value::String(description.clone()),
        );
    }
    if let Some(license_text) = &options.license_text {
        kwargs.insert(
            "license_text".to_string(),
            Value::String(license_text.clone()),
        );
    }
    kwargs.insert(
        "dependencies".to_string(),
        Value::Array(
            options
                .dependencies
                .iter()
                .map(|d| Value::String(d.clone()))
                .collect(),
        ),
    );
    if let Some(pypi_name) = &options.pypi_name {
        kwargs.insert("pypi_name".to_string(), Value::String(pypi_name.clone()));
    }

    let mut allowlist: Vec<Value> = Vec::new();
    for spec in options
        .ancillary_allowlist
        .iter()
        .chain(options.ancillary_list.iter())
    {
        let value = Value::String(spec.clone());
        if !allowlist.contains(&value) {
            allowlist.push(value);
        }
    }
    if !allowlist.is_empty() {
        kwargs.insert("ancillary_allowlist".to_string(), Value::Array(allowlist));
    }

    for (key, value) in &options.extra {
        kwargs.insert(key.clone(), value.clone());
    }
    kwargs
}

/// Drop orchestrator-owned keys from a kwargs map
pub fn sanitize_kwargs(kwargs: &Map<String, Value>) -> Map<String, Value> {
    kwargs
        .iter()
        .filter(|(key, _)| !RESERVED_KWARGS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Verify the package directory exists under the repo parent root
pub fn ensure_package_dir(repo_parent_root: &str, package: &str) -> Result<PathBuf, PublishError> {
    let pkg_path = Path::new(repo_parent_root).join(package);
    if !pkg_path.is_dir() {
        return Err(PublishError::PackageDirNotFound {
            package: package.to_string(),
            path: pkg_path,
        });
    }
    Ok(pkg_path)
}

/// Derive the conventional main module basename for a package
///
/// `x_make_foo_x` ships its logic as `x_cls_make_foo_x.py`; packages that
/// do not follow the naming convention keep their own name plus `.py`.
pub fn derive_main_basename(package: &str) -> String {
    format!("{}.py", package.replace("x_make_", "x_cls_make_"))
}

/// Find the main module file inside a package directory
///
/// The conventional basename wins when present; otherwise the directory is
/// scanned for `x_cls_make_*.py` candidates and the lexicographically first
/// one is taken.
pub fn discover_main_file(pkg_path: &Path, package: &str) -> Result<String, PublishError> {
    let expected = derive_main_basename(package);
    if pkg_path.join(&expected).is_file() {
        return Ok(expected);
    }

    let mut candidates: Vec<String> = Vec::new();
    if let Ok(entries) = fs::read_dir(pkg_path) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("x_cls_make_")
                && name.ends_with(".py")
                && entry.path().is_file()
            {
                candidates.push(name);
            }
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| PublishError::MainFileNotFound {
            package: package.to_string(),
            expected,
        })
}

/// Build the full publish context for one manifest entry
pub fn build_publish_context(
    repo_parent_root: &str,
    entry: &ManifestEntry,
) -> Result<PublishContext, PublishError> {
    let pkg_path = ensure_package_dir(repo_parent_root, &entry.package)?;
    let main_file = discover_main_file(&pkg_path, &entry.package)?;
    let ancillary_files = collect_manifest_ancillaries(&pkg_path, &entry.ancillary);
    let safe_kwargs = sanitize_kwargs(&options_to_kwargs(entry));

    Ok(PublishContext {
        package: entry.package.clone(),
        version: entry.version.clone(),
        distribution: entry.distribution_name().to_string(),
        pkg_path,
        main_file,
        ancillary_files,
        safe_kwargs,
    })
}
