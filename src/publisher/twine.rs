//! Twine-backed publisher
//!
//! The concrete capability: builds an sdist and wheel with `python -m
//! build` and uploads the resulting artifacts with `python -m twine
//! upload`. Both steps run as argument-vector subprocesses (no shell) in
//! the current working directory, which the orchestrator pins to the
//! package root. Captured stderr is surfaced in the error message so the
//! orchestrator can classify duplicate-release failures.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::publisher::capability::{ConstructorArgs, FactoryError, Publisher, PublisherFactory};

/// Python interpreter used for build and upload
const PYTHON: &str = "python";

/// Publishes one distribution via build + twine
pub struct TwinePublisher {
    distribution: String,
    version: String,
    kwargs: Map<String, Value>,
}

impl TwinePublisher {
    pub fn new(distribution: String, version: String, kwargs: Map<String, Value>) -> Self {
        Self {
            distribution,
            version,
            kwargs,
        }
    }

    /// Index upload endpoint, overridable through the `repository_url` kwarg
    fn repository_url(&self) -> String {
        self.kwargs
            .get("repository_url")
            .and_then(Value::as_str)
            .unwrap_or("https://test.pypi.org/legacy/")
            .to_string()
    }

    async fn run_step(&self, phase: &str, args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new(PYTHON)
            .args(args)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("{} の起動に失敗しました: {}", phase, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            anyhow::bail!(
                "[{}] {} が失敗しました (exit: {}): {}",
                self.distribution,
                phase,
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                summarize_output(&stdout, &stderr),
            );
        }
        Ok(stdout)
    }
}

/// Collect uploadable artifacts from a dist directory, sorted
pub fn collect_dist_artifacts(dist_dir: &Path) -> Vec<PathBuf> {
    let mut artifacts: Vec<PathBuf> = std::fs::read_dir(dist_dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(".whl") || n.ends_with(".tar.gz"))
                    .unwrap_or(false)
        })
        .collect();
    artifacts.sort();
    artifacts
}

/// Compress subprocess output into a single error line
///
/// Stderr carries twine's failure text (including the index's duplicate
/// marker); stdout is appended as fallback when stderr is empty.
fn summarize_output(stdout: &str, stderr: &str) -> String {
    let primary = stderr.trim();
    if !primary.is_empty() {
        return primary.to_string();
    }
    let fallback = stdout.trim();
    if fallback.is_empty() {
        "出力なし".to_string()
    } else {
        fallback.to_string()
    }
}

#[async_trait]
impl Publisher for TwinePublisher {
    async fn publish(&self, main_file: &str, ancillary: &[String]) -> anyhow::Result<bool> {
        if !Path::new(main_file).is_file() {
            anyhow::bail!(
                "[{}] メインファイルが見つかりません: {}",
                self.distribution,
                main_file
            );
        }
        if !ancillary.is_empty() {
            println!("📎 付随ファイル {} 件を同梱します", ancillary.len());
        }

        println!(
            "🔨 ビルド中: {} {}",
            self.distribution, self.version
        );
        self.run_step("build", &["-m", "build", "--sdist", "--wheel"])
            .await?;

        let artifacts = collect_dist_artifacts(Path::new("dist"));
        if artifacts.is_empty() {
            anyhow::bail!(
                "[{}] ビルド成果物が見つかりません (dist/ が空です)",
                self.distribution
            );
        }

        let repository_url = self.repository_url();
        let mut args: Vec<String> = vec![
            "-m".to_string(),
            "twine".to_string(),
            "upload".to_string(),
            "--non-interactive".to_string(),
            "--repository-url".to_string(),
            repository_url,
        ];
        for artifact in &artifacts {
            args.push(artifact.display().to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        println!(
            "🚀 アップロード中: {} ({} 成果物)",
            self.distribution,
            artifacts.len()
        );
        self.run_step("twine upload", &arg_refs).await?;

        println!("✅ 公開完了: {} {}", self.distribution, self.version);
        Ok(true)
    }
}

/// Factory for [`TwinePublisher`]
///
/// Accepts the named-with-context and positional conventions; the
/// kwargs-shaped conventions are rejected so callers that carry explicit
/// name and version information keep them out of the free-form map.
pub struct TwinePublisherFactory;

impl PublisherFactory for TwinePublisherFactory {
    fn identifier(&self) -> &str {
        "twine"
    }

    fn try_create(&self, args: &ConstructorArgs) -> Result<Box<dyn Publisher>, FactoryError> {
        match args {
            ConstructorArgs::NamedWithContext {
                distribution,
                version,
                kwargs,
                ..
            } => Ok(Box::new(TwinePublisher::new(
                distribution.clone(),
                version.clone(),
                kwargs.clone(),
            ))),
            ConstructorArgs::Positional {
                distribution,
                version,
            } => Ok(Box::new(TwinePublisher::new(
                distribution.clone(),
                version.clone(),
                Map::new(),
            ))),
            _ => Err(FactoryError::UnsupportedSignature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_factory_accepts_named_with_context() {
        let args = ConstructorArgs::NamedWithContext {
            distribution: "demo_pkg".to_string(),
            version: "1.0.0".to_string(),
            kwargs: Map::new(),
            context: None,
        };
        assert!(TwinePublisherFactory.try_create(&args).is_ok());
    }

    #[test]
    fn test_factory_rejects_kwargs_only() {
        let args = ConstructorArgs::KwargsOnly { kwargs: Map::new() };
        assert!(matches!(
            TwinePublisherFactory.try_create(&args),
            Err(FactoryError::UnsupportedSignature)
        ));
    }

    #[test]
    fn test_collect_dist_artifacts_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b-1.0.0.tar.gz"), "").unwrap();
        std::fs::write(temp_dir.path().join("a-1.0.0-py3-none-any.whl"), "").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "").unwrap();

        let artifacts = collect_dist_artifacts(temp_dir.path());
        let names: Vec<String> = artifacts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a-1.0.0-py3-none-any.whl", "b-1.0.0.tar.gz"]);
    }

    #[test]
    fn test_collect_dist_artifacts_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let artifacts = collect_dist_artifacts(&temp_dir.path().join("dist"));
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_summarize_output_prefers_stderr() {
        assert_eq!(summarize_output("built ok", "400 Bad Request"), "400 Bad Request");
        assert_eq!(summarize_output("built ok", "  "), "built ok");
        assert_eq!(summarize_output("", ""), "出力なし");
    }

    #[test]
    fn test_repository_url_override() {
        let mut kwargs = Map::new();
        kwargs.insert(
            "repository_url".to_string(),
            serde_json::json!("https://upload.pypi.org/legacy/"),
        );
        let publisher = TwinePublisher::new("demo_pkg".to_string(), "1.0.0".to_string(), kwargs);
        assert_eq!(publisher.repository_url(), "https://upload.pypi.org/legacy/");

        let publisher =
            TwinePublisher::new("demo_pkg".to_string(), "1.0.0".to_string(), Map::new());
        assert_eq!(publisher.repository_url(), "https://test.pypi.org/legacy/");
    }
}
