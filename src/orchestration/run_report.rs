//! Run report construction and persistence
//!
//! Every publish run produces exactly one JSON report file. The report is
//! built incrementally while the run progresses (per-entry records start as
//! `pending` and are upgraded in place) and persisted once at the end, on
//! success and on failure alike. Persistence is atomic: the document is
//! written to a temp file in the reports directory and renamed over the
//! final name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::PublishError;
use crate::core::manifest::ManifestEntry;
use crate::core::telemetry::TOOL_NAME;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    /// Completed, but at least one entry needs a human look
    Attention,
    Error,
}

/// Per-entry outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Published,
    SkippedExisting,
    Error,
}

/// Echo of one manifest entry, kept in the report inputs for auditability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntryEcho {
    pub package: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancillary: Vec<String>,
}

impl From<&ManifestEntry> for ManifestEntryEcho {
    fn from(entry: &ManifestEntry) -> Self {
        Self {
            package: entry.package.clone(),
            version: entry.version.clone(),
            ancillary: entry.ancillary.clone(),
        }
    }
}

/// Files that went out for one distribution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedArtifact {
    pub main: String,
    #[serde(rename = "anc", default, skip_serializing_if = "Vec::is_empty")]
    pub ancillary: Vec<String>,
}

/// Progress record for one manifest entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResult {
    pub package: String,
    pub version: String,
    pub distribution: String,
    pub status: EntryStatus,

    /// Ancillary names as listed in the manifest
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancillary_requested: Vec<String>,

    /// Ancillary paths actually resolved for publishing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancillary_publish: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_dir: Option<String>,

    /// Sanitized kwargs handed to the publisher
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub kwargs: serde_json::Map<String, serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error record in the report result section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub package: String,
    pub stage: String,
    pub message: String,
}

/// Inputs section of the run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsDetail {
    pub entry_count: usize,
    pub manifest_entries: Vec<ManifestEntryEcho>,
    pub repo_parent_root: String,
    pub index_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

/// Execution section of the run report
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionDetail {
    /// Identifier of the publisher factory the run resolved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    pub records: Vec<EntryResult>,

    /// Published version per distribution; `null` when the publisher
    /// completed without confirming the upload
    pub published_versions: BTreeMap<String, Option<String>>,

    pub artifacts: BTreeMap<String, PublishedArtifact>,
}

/// Result section of the run report
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResultDetail {
    pub published_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
}

/// The full run report document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub tool: String,
    pub status: RunStatus,

    /// Timestamp of the last time this document was assembled
    pub generated_at: String,
    pub started_at: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    pub inputs: InputsDetail,
    pub execution: ExecutionDetail,
    pub result: ResultDetail,
}

fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Incremental builder around [`RunReport`]
pub struct RunReportBuilder {
    report: RunReport,
    started: Instant,
}

impl RunReportBuilder {
    /// Start a new report with a fresh 32-hex run id
    pub fn new(
        entries: &[ManifestEntry],
        repo_parent_root: &str,
        index_url: &str,
        token_env: Option<&str>,
    ) -> Self {
        let report = RunReport {
            run_id: Uuid::new_v4().simple().to_string(),
            tool: TOOL_NAME.to_string(),
            status: RunStatus::Running,
            generated_at: utc_now_iso(),
            started_at: utc_now_iso(),
            completed_at: None,
            duration_seconds: None,
            inputs: InputsDetail {
                entry_count: entries.len(),
                manifest_entries: entries.iter().map(ManifestEntryEcho::from).collect(),
                repo_parent_root: repo_parent_root.to_string(),
                index_url: index_url.to_string(),
                token_env: token_env.map(str::to_string),
            },
            execution: ExecutionDetail::default(),
            result: ResultDetail::default(),
        };
        Self {
            report,
            started: Instant::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.report.run_id
    }

    /// Record the publisher factory the run resolved to
    pub fn set_publisher(&mut self, identifier: &str) {
        self.report.execution.publisher = Some(identifier.to_string());
    }

    /// Append a `pending` record for an entry about to be processed
    pub fn start_entry(&mut self, entry: &ManifestEntry, distribution: &str) {
        self.report.execution.records.push(EntryResult {
            package: entry.package.clone(),
            version: entry.version.clone(),
            distribution: distribution.to_string(),
            status: EntryStatus::Pending,
            ancillary_requested: entry.ancillary.clone(),
            ancillary_publish: Vec::new(),
            package_dir: None,
            kwargs: serde_json::Map::new(),
            main_file: None,
            message: None,
        });
    }

    /// Fill in the resolved context on the current record
    pub fn record_context(
        &mut self,
        package_dir: &std::path::Path,
        kwargs: &serde_json::Map<String, serde_json::Value>,
        ancillary_publish: &[String],
    ) {
        if let Some(record) = self.last_record_mut() {
            record.package_dir = Some(package_dir.display().to_string());
            record.kwargs = kwargs.clone();
            record.ancillary_publish = ancillary_publish.to_vec();
        }
    }

    fn last_record_mut(&mut self) -> Option<&mut EntryResult> {
        self.report.execution.records.last_mut()
    }

    /// Upgrade the current record to `published`
    pub fn mark_published(
        &mut self,
        main_file: &str,
        version: Option<String>,
        artifact: PublishedArtifact,
    ) {
        let distribution = match self.last_record_mut() {
            Some(record) => {
                record.status = EntryStatus::Published;
                record.main_file = Some(main_file.to_string());
                record.distribution.clone()
            }
            None => return,
        };
        self.report.result.published_count += 1;
        self.report
            .execution
            .published_versions
            .insert(distribution.clone(), version);
        self.report.execution.artifacts.insert(distribution, artifact);
    }

    /// Upgrade the current record to `skipped_existing`
    ///
    /// The release already exists on the index, so the artifact record is
    /// kept just like a fresh publish would keep it.
    pub fn mark_skipped_existing(
        &mut self,
        main_file: &str,
        version: &str,
        message: &str,
        artifact: PublishedArtifact,
    ) {
        let distribution = match self.last_record_mut() {
            Some(record) => {
                record.status = EntryStatus::SkippedExisting;
                record.main_file = Some(main_file.to_string());
                record.message = Some(message.to_string());
                record.distribution.clone()
            }
            None => return,
        };
        self.report.result.skipped_count += 1;
        self.report
            .execution
            .published_versions
            .insert(distribution.clone(), Some(version.to_string()));
        self.report.execution.artifacts.insert(distribution, artifact);
    }

    /// Upgrade the current record to `error`
    pub fn mark_error(&mut self, stage: &str, message: &str) {
        let package = match self.last_record_mut() {
            Some(record) => {
                record.status = EntryStatus::Error;
                record.message = Some(message.to_string());
                record.package.clone()
            }
            None => return,
        };
        self.push_error(&package, stage, message);
    }

    /// Record a failure for an entry that never produced a record
    pub fn push_setup_error(&mut self, entry: &ManifestEntry, error: &PublishError) {
        self.report.execution.records.push(EntryResult {
            package: entry.package.clone(),
            version: entry.version.clone(),
            distribution: entry.distribution_name().to_string(),
            status: EntryStatus::Error,
            ancillary_requested: entry.ancillary.clone(),
            ancillary_publish: Vec::new(),
            package_dir: None,
            kwargs: serde_json::Map::new(),
            main_file: None,
            message: Some(error.to_string()),
        });
        self.push_error(&entry.package, "setup", &error.to_string());
    }

    fn push_error(&mut self, package: &str, stage: &str, message: &str) {
        self.report.result.error_count += 1;
        self.report.result.errors.push(ErrorEntry {
            package: package.to_string(),
            stage: stage.to_string(),
            message: message.to_string(),
        });
    }

    /// Close the report with a final status and timing
    pub fn finalize(&mut self, status: RunStatus) -> &RunReport {
        self.report.status = status;
        self.report.generated_at = utc_now_iso();
        self.report.completed_at = Some(utc_now_iso());
        let elapsed = self.started.elapsed().as_secs_f64();
        self.report.duration_seconds = Some((elapsed * 1000.0).round() / 1000.0);
        &self.report
    }

    /// Final status derived from the accumulated counters
    pub fn derived_status(&self) -> RunStatus {
        if self.report.result.error_count > 0 {
            RunStatus::Error
        } else if self.report.result.skipped_count > 0 {
            RunStatus::Attention
        } else {
            RunStatus::Completed
        }
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }
}

/// File name for a run report
pub fn report_file_name(run_id: &str) -> String {
    format!("{}_run_{}.json", TOOL_NAME, run_id)
}

/// Persist a report atomically under the reports directory
///
/// The directory is created when missing. Returns the final report path.
pub async fn write_run_report(report: &RunReport, report_dir: &Path) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(report_dir).await?;

    let final_path = report_dir.join(report_file_name(&report.run_id));
    let temp_path = report_dir.join(format!(".{}.tmp", report_file_name(&report.run_id)));

    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(&temp_path, json).await?;
    tokio::fs::rename(&temp_path, &final_path).await?;

    Ok(final_path)
}
