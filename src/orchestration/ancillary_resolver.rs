//! Ancillary file resolution
//!
//! Resolves ancillary file names and `@allowlist` references into a
//! deduplicated set of package-root-relative POSIX paths. Everything here is
//! best-effort: entries that are missing, unresolvable, directories, or that
//! escape the package root are dropped with a diagnostic and never abort the
//! surrounding publish. The containment invariant is absolute: an accepted
//! path always canonicalizes to a descendant of the canonicalized package
//! root.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Normalize a relative path string to POSIX form
pub fn to_posix_rel(rel: &str) -> String {
    rel.trim()
        .trim_start_matches(['/', '\\'])
        .replace('\\', "/")
}

fn path_to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Relativize an absolute path against a base directory, if safe
///
/// Returns `None` unless both paths canonicalize, the candidate is a
/// regular file, and it lies strictly inside the base directory.
pub fn safe_rel_from_abs(abs_path: &Path, base_dir: &Path) -> Option<String> {
    let abs_resolved = fs::canonicalize(abs_path).ok()?;
    let base_resolved = fs::canonicalize(base_dir).ok()?;
    if !abs_resolved.is_file() {
        return None;
    }
    let rel = abs_resolved.strip_prefix(&base_resolved).ok()?;
    Some(path_to_posix(rel))
}

fn add_entry(collected: &mut Vec<String>, seen: &mut HashSet<String>, entry: String) {
    if seen.insert(entry.clone()) {
        collected.push(entry);
    }
}

/// Read an allowlist file into package-root-relative POSIX paths
///
/// Blank lines and `#` comments are skipped; a leading `@` on a line is
/// stripped. Each surviving line resolves against the package root (or
/// stands alone when absolute) and must pass the containment check.
pub fn load_ancillary_allowlist(list_file: &Path, pkg_dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let Ok(pkg_resolved) = fs::canonicalize(pkg_dir) else {
        println!(
            "⚠️  Package directory could not be resolved: {}",
            pkg_dir.display()
        );
        return out;
    };
    let list_path = fs::canonicalize(list_file).unwrap_or_else(|_| list_file.to_path_buf());
    if !list_path.is_file() {
        println!("⚠️  Ancillary allowlist not found: {}", list_path.display());
        return out;
    }
    let lines = match fs::read_to_string(&list_path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!(
                "❌ Failed to read ancillary allowlist {}: {}",
                list_path.display(),
                e
            );
            return out;
        }
    };

    let mut seen = HashSet::new();
    for raw in lines.lines() {
        let mut line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('@') {
            line = stripped.trim();
        }
        let fragment = PathBuf::from(line);
        let candidate = if fragment.is_absolute() {
            fragment
        } else {
            pkg_resolved.join(fragment)
        };
        let Ok(candidate) = fs::canonicalize(&candidate) else {
            println!("⚠️  Skipping ancillary entry that could not be resolved: {line}");
            continue;
        };
        if !candidate.starts_with(&pkg_resolved) {
            println!("⚠️  Skipping ancillary outside package dir: {line}");
            continue;
        }
        if !candidate.is_file() {
            println!("⚠️  Skipping non-file ancillary entry: {line}");
            continue;
        }
        if let Ok(rel) = candidate.strip_prefix(&pkg_resolved) {
            add_entry(&mut out, &mut seen, path_to_posix(rel));
        }
    }
    out
}

fn collect_direct_entry(
    pkg_path: &Path,
    name: &str,
    seen: &mut HashSet<String>,
    collected: &mut Vec<String>,
) {
    let safe_name = name.trim_start_matches(['/', '\\']);
    let candidate = pkg_path.join(safe_name);
    let resolved = fs::canonicalize(&candidate).unwrap_or(candidate);
    if resolved.is_file() {
        if let Some(rel) = safe_rel_from_abs(&resolved, pkg_path) {
            add_entry(collected, seen, rel);
        }
        return;
    }
    if resolved.is_dir() {
        println!(
            "⚠️  Ancillary directory provided but not auto-included \
             (use '@<allowlist>' or the ancillary_allowlist option): {name}"
        );
        return;
    }
    println!("⚠️  Ancillary path not found: {name}");
}

/// Resolve the manifest-level ancillary names for a package
///
/// Plain names resolve directly; `@listfile` names expand through the
/// allowlist loader. Output keeps first-seen order.
pub fn collect_manifest_ancillaries(pkg_path: &Path, ancillary_names: &[String]) -> Vec<String> {
    if ancillary_names.is_empty() {
        return Vec::new();
    }
    let mut collected = Vec::new();
    let mut seen = HashSet::new();
    for name in ancillary_names {
        if let Some(listfile) = name.strip_prefix('@') {
            let allow_path = pkg_path.join(listfile.trim());
            for rel in load_ancillary_allowlist(&allow_path, pkg_path) {
                add_entry(&mut collected, &mut seen, rel);
            }
            continue;
        }
        collect_direct_entry(pkg_path, name, &mut seen, &mut collected);
    }
    collected
}

fn normalize_publish_path(pkg_path: &Path, entry: &str) -> Option<String> {
    let candidate = PathBuf::from(entry);
    let resolved = if candidate.is_absolute() {
        candidate.clone()
    } else {
        pkg_path.join(&candidate)
    };
    let resolved = fs::canonicalize(&resolved).ok()?;
    if resolved.is_dir() {
        let display = if candidate.is_absolute() {
            resolved.display().to_string()
        } else {
            safe_dir_display(&resolved, pkg_path)
        };
        println!("⚠️  Ignoring ancillary directory (no auto-expansion): {display}");
        return None;
    }
    let rel = safe_rel_from_abs(&resolved, pkg_path)?;
    Some(to_posix_rel(&rel))
}

fn safe_dir_display(resolved: &Path, pkg_path: &Path) -> String {
    fs::canonicalize(pkg_path)
        .ok()
        .and_then(|base| resolved.strip_prefix(base).ok().map(path_to_posix))
        .unwrap_or_else(|| resolved.display().to_string())
}

/// Extract allowlist specs from the sanitized kwargs
///
/// The primary key is `ancillary_allowlist`; `ancillary_list` remains
/// honored for specs injected through free-form extras. Accepts a single
/// string or a list of strings.
pub fn normalize_allowlist_specs(safe_kwargs: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    let spec = safe_kwargs
        .get("ancillary_allowlist")
        .filter(|v| !v.is_null())
        .or_else(|| safe_kwargs.get("ancillary_list").filter(|v| !v.is_null()));
    match spec {
        Some(serde_json::Value::String(single)) => vec![single.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Resolve the final ancillary list for a publish context
///
/// Direct entries come first (allowlist references are handled through the
/// kwargs specs), then every allowlist spec expands and re-normalizes. The
/// result is lexicographically sorted whenever more than one path survives,
/// so artifact lists are deterministic for reporting and testing.
pub fn collect_publish_ancillaries(
    pkg_path: &Path,
    ancillary_files: &[String],
    safe_kwargs: &serde_json::Map<String, serde_json::Value>,
) -> Vec<String> {
    let mut collected = Vec::new();
    let mut seen = HashSet::new();

    for entry in ancillary_files {
        if entry.starts_with('@') {
            continue;
        }
        if let Some(normalized) = normalize_publish_path(pkg_path, entry) {
            add_entry(&mut collected, &mut seen, normalized);
        }
    }

    for spec in normalize_allowlist_specs(safe_kwargs) {
        let trimmed = spec.strip_prefix('@').map(str::trim).unwrap_or(&spec);
        let spec_path = pkg_path.join(trimmed);
        for rel in load_ancillary_allowlist(&spec_path, pkg_path) {
            if let Some(normalized) = normalize_publish_path(pkg_path, &rel) {
                add_entry(&mut collected, &mut seen, normalized);
            }
        }
    }

    if collected.len() > 1 {
        collected.sort();
    }
    collected
}
