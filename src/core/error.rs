//! Error handling for the publish flow
//!
//! This module provides the error types for manifest-driven publishing
//! using the thiserror crate for ergonomic error handling.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for publish-flow operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Setup errors
    #[error("[{package}] パッケージディレクトリが見つかりません: {}", path.display())]
    PackageDirNotFound { package: String, path: PathBuf },

    #[error("[{package}] メインファイルが見つかりません（期待: {expected}）")]
    MainFileNotFound { package: String, expected: String },

    // Connectivity errors
    #[error("インデックスへの接続確認に失敗しました: {url}: {message}")]
    PrecheckFailed { url: String, message: String },

    // Publishing errors
    #[error("[{distribution}] 公開処理に失敗しました: {message}")]
    PublishFailed {
        distribution: String,
        message: String,
    },

    // Input errors
    #[error("マニフェストの検証に失敗しました: {message}")]
    InvalidManifest { message: String },

    #[error("マニフェストを読み込めませんでした: {}: {message}", path.display())]
    ManifestLoad { path: PathBuf, message: String },
}

impl PublishError {
    /// Check if this error is recoverable
    ///
    /// Connectivity precheck failures and input errors abort the run before
    /// any entry is touched; setup and publish errors abort the remaining
    /// entries but still leave a persisted report behind.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PackageDirNotFound { .. }
                | Self::MainFileNotFound { .. }
                | Self::PublishFailed { .. }
        )
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::PackageDirNotFound { .. } => "PACKAGE_DIR_NOT_FOUND",
            Self::MainFileNotFound { .. } => "MAIN_FILE_NOT_FOUND",
            Self::PrecheckFailed { .. } => "PRECHECK_FAILED",
            Self::PublishFailed { .. } => "PUBLISH_FAILED",
            Self::InvalidManifest { .. } => "INVALID_MANIFEST",
            Self::ManifestLoad { .. } => "MANIFEST_LOAD",
        }
    }
}

/// Run-level failure carrying the persisted report path as a side channel
///
/// When a publish run aborts after partial progress the orchestrator still
/// persists the run report; the caller can locate it through `report_path`
/// without re-deriving the reports directory.
#[derive(Debug)]
pub struct RunError {
    pub error: anyhow::Error,
    pub report_path: Option<PathBuf>,
}

impl RunError {
    /// Wrap an error without a persisted report (e.g. precheck failures)
    pub fn new(error: anyhow::Error) -> Self {
        Self {
            error,
            report_path: None,
        }
    }

    /// Wrap an error together with the path of the report that captured it
    pub fn with_report(error: anyhow::Error, report_path: PathBuf) -> Self {
        Self {
            error,
            report_path: Some(report_path),
        }
    }

    /// Render the fixed error contract payload
    ///
    /// The payload always carries `status: "failure"` and a message; the
    /// open-ended `details` object carries the report-path breadcrumb when
    /// a report was persisted.
    pub fn to_error_payload(&self) -> serde_json::Value {
        let mut details = serde_json::Map::new();
        if let Some(ref path) = self.report_path {
            details.insert(
                "run_report_path".to_string(),
                serde_json::Value::String(path.display().to_string()),
            );
        }
        serde_json::json!({
            "status": "failure",
            "message": self.error.to_string(),
            "details": serde_json::Value::Object(details),
        })
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(ref path) = self.report_path {
            write!(f, " (run report: {})", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}
