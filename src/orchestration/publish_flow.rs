//! Manifest-driven publish orchestration
//!
//! The flow processes manifest entries strictly in order: connectivity
//! precheck, then per entry context building, publisher construction,
//! and the publish call itself, with the working directory pinned to the
//! package root. Failures whose rendered error chain carries a known
//! duplicate-release marker downgrade to `skipped_existing` (re-publishing
//! an existing version is not an error); anything else aborts the run.
//! Whatever happened, the run report is persisted before the flow returns,
//! and on failure its path travels with the error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use lazy_static::lazy_static;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::core::error::{PublishError, RunError};
use crate::core::http::{HttpClient, IndexTransport};
use crate::core::manifest::ManifestEntry;
use crate::core::workdir::WorkdirGuard;
use crate::orchestration::ancillary_resolver::collect_publish_ancillaries;
use crate::orchestration::manifest_processor::{build_publish_context, PublishContext};
use crate::orchestration::run_report::{
    write_run_report, PublishedArtifact, RunReportBuilder, RunStatus,
};
use crate::publisher::capability::{instantiate_publisher, PublisherFactory};
use crate::security::credentials::{mask_tokens_in_text, resolve_token};

lazy_static! {
    /// Index responses that mean "this exact file was uploaded before"
    static ref DEFAULT_DUPLICATE_MARKERS: Vec<String> = vec![
        "file already exists".to_string(),
        "400 bad request".to_string(),
        "file-name-reuse".to_string(),
        "already exists on pypi".to_string(),
    ];
}

/// Default index root (publishes go to the test index unless overridden)
pub const DEFAULT_INDEX_URL: &str = "https://test.pypi.org/";

const PRECHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Flow configuration
#[derive(Debug, Clone)]
pub struct PublishFlowOptions {
    /// Directory containing the per-package subdirectories
    pub repo_parent_root: String,

    /// Environment variable holding the upload token
    pub token_env: Option<String>,

    /// Index root URL used for the precheck
    pub index_url: String,

    /// Directory run reports are persisted into
    pub report_dir: PathBuf,

    /// Case-insensitive substrings classifying duplicate-release failures
    pub duplicate_markers: Vec<String>,
}

impl PublishFlowOptions {
    pub fn new(repo_parent_root: impl Into<String>) -> Self {
        Self {
            repo_parent_root: repo_parent_root.into(),
            token_env: None,
            index_url: DEFAULT_INDEX_URL.to_string(),
            report_dir: PathBuf::from("reports"),
            duplicate_markers: DEFAULT_DUPLICATE_MARKERS.clone(),
        }
    }
}

/// Aggregate result of a completed (or attention) run
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub versions: BTreeMap<String, Option<String>>,
    pub artifacts: BTreeMap<String, PublishedArtifact>,
    pub report_path: PathBuf,
}

/// Render an error with its full cause chain on one line
pub fn error_chain_summary(error: &anyhow::Error) -> String {
    error
        .chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// The manifest-driven publish orchestrator
pub struct PublishFlow {
    options: PublishFlowOptions,
    marker_matcher: AhoCorasick,
    transport: Box<dyn IndexTransport>,
}

impl PublishFlow {
    pub fn new(options: PublishFlowOptions) -> Self {
        Self::with_transport(options, Box::new(HttpClient::new(PRECHECK_TIMEOUT)))
    }

    /// Inject a transport (tests run against a stub)
    pub fn with_transport(options: PublishFlowOptions, transport: Box<dyn IndexTransport>) -> Self {
        // Falls back to the default markers if the configured list does
        // not compile (the defaults are literals and always do).
        let marker_matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(&options.duplicate_markers)
            .unwrap_or_else(|_| {
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .build(DEFAULT_DUPLICATE_MARKERS.iter())
                    .expect("default duplicate markers compile")
            });
        Self {
            options,
            marker_matcher,
            transport,
        }
    }

    fn is_duplicate_failure(&self, summary: &str) -> bool {
        !self.options.duplicate_markers.is_empty() && self.marker_matcher.is_match(summary)
    }

    /// HEAD the index root, with the token as an `Authorization` header
    async fn precheck(&self) -> Result<(), PublishError> {
        let url = self.options.index_url.clone();
        let headers: Vec<(String, String)> = resolve_token(self.options.token_env.as_deref())
            .map(|(_, token)| {
                vec![(
                    "Authorization".to_string(),
                    format!("token {}", token.expose_secret()),
                )]
            })
            .unwrap_or_default();

        self.transport
            .head(&url, &headers)
            .await
            .map_err(|e| PublishError::PrecheckFailed {
                url,
                message: e.to_string(),
            })
    }

    /// Publish every manifest entry, in order
    ///
    /// A precheck failure aborts before any entry and leaves no report.
    /// Everything after the precheck persists a report, success or not.
    pub async fn publish_manifest_entries(
        &self,
        entries: &[ManifestEntry],
        factory: &dyn PublisherFactory,
        context: Option<&Value>,
    ) -> Result<PublishOutcome, RunError> {
        if let Err(e) = self.precheck().await {
            eprintln!("❌ {e}");
            return Err(RunError::new(e.into()));
        }
        println!("✅ インデックスへの接続を確認しました: {}", self.options.index_url);

        let mut builder = RunReportBuilder::new(
            entries,
            &self.options.repo_parent_root,
            &self.options.index_url,
            self.options.token_env.as_deref(),
        );
        builder.set_publisher(factory.identifier());
        println!("🚀 公開処理を開始します (run_id: {})", builder.run_id());

        let mut abort: Option<anyhow::Error> = None;

        for entry in entries {
            let ctx = match build_publish_context(&self.options.repo_parent_root, entry) {
                Ok(ctx) => ctx,
                Err(e) => {
                    eprintln!("❌ {e}");
                    builder.push_setup_error(entry, &e);
                    abort = Some(e.into());
                    break;
                }
            };

            builder.start_entry(entry, &ctx.distribution);
            println!(
                "📦 [{}] {} {} を公開します",
                ctx.package, ctx.distribution, ctx.version
            );

            if let Err(e) = self.publish_one(&ctx, factory, context, &mut builder).await {
                abort = Some(e);
                break;
            }
        }

        let status = if abort.is_some() {
            RunStatus::Error
        } else {
            builder.derived_status()
        };
        builder.finalize(status);

        let report_path = match write_run_report(builder.report(), &self.options.report_dir).await {
            Ok(path) => path,
            Err(write_error) => {
                eprintln!("❌ レポートの保存に失敗しました: {write_error}");
                let error = match abort {
                    Some(run_error) => run_error.context("レポートの保存にも失敗しました"),
                    None => write_error,
                };
                return Err(RunError::new(error));
            }
        };
        println!("📄 実行レポート: {}", report_path.display());

        if let Some(error) = abort {
            return Err(RunError::with_report(error, report_path));
        }

        let report = builder.report();
        Ok(PublishOutcome {
            run_id: report.run_id.clone(),
            status,
            versions: report.execution.published_versions.clone(),
            artifacts: report.execution.artifacts.clone(),
            report_path,
        })
    }

    async fn publish_one(
        &self,
        ctx: &PublishContext,
        factory: &dyn PublisherFactory,
        context: Option<&Value>,
        builder: &mut RunReportBuilder,
    ) -> anyhow::Result<()> {
        // The flow owns the decision to publish; the capability must not
        // second-guess an explicit manifest entry.
        let mut kwargs = ctx.safe_kwargs.clone();
        kwargs.insert("force_publish".to_string(), Value::Bool(true));

        let ancillary = collect_publish_ancillaries(&ctx.pkg_path, &ctx.ancillary_files, &kwargs);
        builder.record_context(&ctx.pkg_path, &kwargs, &ancillary);

        let publisher = match instantiate_publisher(
            factory,
            &ctx.distribution,
            &ctx.version,
            &kwargs,
            context,
        ) {
            Ok(publisher) => publisher,
            Err(e) => {
                let summary = mask_tokens_in_text(&error_chain_summary(&e));
                eprintln!("❌ {summary}");
                builder.mark_error("construct", &summary);
                return Err(e);
            }
        };

        let result = {
            let _guard = WorkdirGuard::change_to(&ctx.pkg_path).map_err(|e| {
                anyhow::anyhow!(
                    "[{}] 作業ディレクトリを変更できません: {}",
                    ctx.package,
                    e
                )
            });
            match _guard {
                Ok(_guard) => publisher.publish(&ctx.main_file, &ancillary).await,
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(confirmed) => {
                let version = confirmed.then(|| ctx.version.clone());
                if confirmed {
                    println!("✅ [{}] 公開しました: {}", ctx.package, ctx.version);
                } else {
                    println!(
                        "⚠️  [{}] 公開は完了しましたが新規アップロードは確認できませんでした",
                        ctx.package
                    );
                }
                builder.mark_published(
                    &ctx.main_file,
                    version,
                    PublishedArtifact {
                        main: ctx.main_file.clone(),
                        ancillary,
                    },
                );
                Ok(())
            }
            Err(e) => {
                let summary = mask_tokens_in_text(&error_chain_summary(&e));
                if self.is_duplicate_failure(&summary) {
                    println!(
                        "⚠️  [{}] {} は既に公開済みのためスキップします",
                        ctx.package, ctx.version
                    );
                    builder.mark_skipped_existing(
                        &ctx.main_file,
                        &ctx.version,
                        &summary,
                        PublishedArtifact {
                            main: ctx.main_file.clone(),
                            ancillary,
                        },
                    );
                    Ok(())
                } else {
                    eprintln!("❌ [{}] {summary}", ctx.package);
                    builder.mark_error("publish", &summary);
                    Err(e.context(PublishError::PublishFailed {
                        distribution: ctx.distribution.clone(),
                        message: summary,
                    }))
                }
            }
        }
    }
}
