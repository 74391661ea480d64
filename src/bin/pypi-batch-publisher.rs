//! PyPI Batch Publisher CLI
//!
//! Manifest-driven batch publishing assistant

use anyhow::Result;
use clap::{Parser, Subcommand};
use pypi_batch_publisher::orchestration::{
    wait_for_release, PollOptions, PublishFlow, PublishFlowOptions, DEFAULT_INDEX_URL,
};
use pypi_batch_publisher::publisher::{PublisherFactory, TwinePublisherFactory};
use pypi_batch_publisher::security::prime_twine_credentials;
use pypi_batch_publisher::validation::ManifestValidator;
use pypi_batch_publisher::{PublishError, PublishManifest};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Manifest-driven batch publishing assistant
#[derive(Parser)]
#[command(name = "pypi-batch-publisher")]
#[command(version = "0.1.0")]
#[command(about = "Manifest-driven batch publishing assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every manifest entry, in order
    Publish {
        /// Manifest file (json, yaml or toml)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Environment variable holding the upload token
        #[arg(long)]
        token_env: Option<String>,

        /// Override the manifest's repository parent root
        #[arg(long)]
        repo_root: Option<String>,

        /// Directory run reports are written into
        #[arg(long, default_value = "reports")]
        report_dir: PathBuf,

        /// Index root URL
        #[arg(long, default_value = DEFAULT_INDEX_URL)]
        index_url: String,

        /// Seconds to wait for each published release to become visible
        /// (0 disables the wait)
        #[arg(long, default_value = "0")]
        wait_timeout: u64,
    },

    /// Validate a manifest without publishing
    Validate {
        /// Manifest file (json, yaml or toml)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },

    /// Wait until a release is visible on the index
    Wait {
        /// Distribution name
        #[arg(value_name = "NAME")]
        name: String,

        /// Version to wait for
        #[arg(value_name = "VERSION")]
        version: String,

        /// Seconds to wait before giving up
        #[arg(long, default_value = "120")]
        timeout: u64,

        /// First backoff delay in seconds
        #[arg(long, default_value = "5")]
        initial_delay: u64,

        /// Index root URL
        #[arg(long, default_value = DEFAULT_INDEX_URL)]
        index_url: String,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Publish {
            manifest,
            token_env,
            repo_root,
            report_dir,
            index_url,
            wait_timeout,
        } => {
            publish_command(
                manifest,
                token_env,
                repo_root,
                report_dir,
                index_url,
                wait_timeout,
            )
            .await
        }
        Commands::Validate { manifest } => validate_command(manifest).await,
        Commands::Wait {
            name,
            version,
            timeout,
            initial_delay,
            index_url,
        } => wait_command(name, version, timeout, initial_delay, index_url).await,
    }
}

fn select_factory(identifier: &str) -> Result<Box<dyn PublisherFactory>> {
    match identifier {
        "twine" => Ok(Box::new(TwinePublisherFactory)),
        other => anyhow::bail!("不明な publisher_factory です: {}", other),
    }
}

async fn publish_command(
    manifest_path: PathBuf,
    token_env: Option<String>,
    repo_root: Option<String>,
    report_dir: PathBuf,
    index_url: String,
    wait_timeout: u64,
) -> Result<i32> {
    println!("\n📦 pypi-batch-publisher\n");

    let manifest = PublishManifest::load(&manifest_path).await?;

    let validation = ManifestValidator::new().validate(&manifest);
    for warning in &validation.warnings {
        println!("⚠️  {}", warning);
    }
    if !validation.is_valid {
        for error in &validation.errors {
            eprintln!("❌ {}", error);
        }
        return Err(PublishError::InvalidManifest {
            message: validation.errors.join("; "),
        }
        .into());
    }

    let token_env = token_env.or(manifest.token_env.clone());
    if prime_twine_credentials(token_env.as_deref()).is_none() {
        println!("⚠️  認証情報が見つかりません（アップロードは失敗する可能性があります）");
    }

    let factory = select_factory(manifest.publisher_factory.as_deref().unwrap_or("twine"))?;

    let mut options = PublishFlowOptions::new(
        repo_root.unwrap_or_else(|| manifest.repo_parent_root.clone()),
    );
    options.token_env = token_env;
    options.index_url = index_url.clone();
    options.report_dir = report_dir;

    let flow = PublishFlow::new(options);
    let outcome = match flow
        .publish_manifest_entries(&manifest.entries, factory.as_ref(), manifest.context.as_ref())
        .await
    {
        Ok(outcome) => outcome,
        Err(run_error) => {
            // Fixed error contract on stdout, human text on stderr
            eprintln!("\n❌ {}", run_error);
            println!(
                "{}",
                serde_json::to_string_pretty(&run_error.to_error_payload())?
            );
            return Ok(1);
        }
    };

    println!("\n📊 公開結果 ({:?}):", outcome.status);
    for (name, version) in &outcome.versions {
        match version {
            Some(version) => println!("  ✅ {} {}", name, version),
            None => println!("  ⚠️  {} (アップロード未確認)", name),
        }
    }

    if wait_timeout > 0 {
        let poll = PollOptions {
            timeout: Duration::from_secs(wait_timeout),
            ..PollOptions::default()
        };
        for (name, version) in &outcome.versions {
            if let Some(version) = version {
                wait_for_release(name, version, &index_url, &poll).await;
            }
        }
    }

    Ok(0)
}

async fn validate_command(manifest_path: PathBuf) -> Result<i32> {
    let manifest = PublishManifest::load(&manifest_path).await?;
    let result = ManifestValidator::new().validate(&manifest);

    for warning in &result.warnings {
        println!("⚠️  {}", warning);
    }
    for error in &result.errors {
        eprintln!("❌ {}", error);
    }

    if result.is_valid {
        println!(
            "✅ マニフェストは有効です ({} エントリ)",
            manifest.entries.len()
        );
        Ok(0)
    } else {
        Ok(1)
    }
}

async fn wait_command(
    name: String,
    version: String,
    timeout: u64,
    initial_delay: u64,
    index_url: String,
) -> Result<i32> {
    let options = PollOptions {
        timeout: Duration::from_secs(timeout),
        initial_delay: Duration::from_secs(initial_delay),
    };

    if wait_for_release(&name, &version, &index_url, &options).await {
        Ok(0)
    } else {
        Ok(1)
    }
}
