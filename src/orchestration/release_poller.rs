//! Release availability polling
//!
//! After an upload the index needs a little time before the new release is
//! visible. The poller probes the project page (HEAD) and falls back to the
//! release metadata endpoint (JSON) for each name candidate, with
//! exponential backoff and a heartbeat event so long waits stay observable.
//! The poller never fails the run: it answers `true` (release visible) or
//! `false` (gave up), nothing more.

use std::time::{Duration, Instant};

use serde_json::json;

use crate::core::http::{HttpClient, IndexTransport};
use crate::core::telemetry::{emit_event, make_event};

/// Backoff floor in seconds after the initial delay has elapsed
const INITIAL_BACKOFF_SECS: f64 = 1.0;
/// Backoff ceiling in seconds
const MAX_DELAY_SECS: f64 = 10.0;
/// Minimum interval between heartbeat events
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Per-request timeout for poll probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Polling knobs
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Total time to keep polling; zero disables it
    pub timeout: Duration,
    /// First backoff delay; never longer than the timeout itself
    pub initial_delay: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Distribution name candidates to probe, in order
///
/// PyPI normalizes underscores to hyphens, so both spellings are tried;
/// duplicates collapse when the name carries no underscore.
pub fn name_candidates(distribution: &str) -> Vec<String> {
    let mut candidates = vec![distribution.to_string()];
    let hyphenated = distribution.replace('_', "-");
    if hyphenated != distribution {
        candidates.push(hyphenated);
    }
    candidates
}

async fn probe_candidate(
    transport: &dyn IndexTransport,
    index_url: &str,
    candidate: &str,
    version: &str,
) -> bool {
    let base = index_url.trim_end_matches('/');

    // The version segment matters: the bare project page exists as soon as
    // any release does, and would report old versions as available.
    let project_url = format!("{base}/project/{candidate}/{version}/");
    if transport.head(&project_url, &[]).await.is_ok() {
        return true;
    }

    let json_url = format!("{base}/pypi/{candidate}/json");
    match transport.get_json(&json_url).await {
        Ok(document) => document
            .get("releases")
            .and_then(|releases| releases.get(version))
            .is_some(),
        Err(_) => false,
    }
}

/// Wait until a release becomes visible on the index
///
/// Probes every candidate each round, backing off exponentially from one
/// second up to ten. A zero or negative timeout skips polling entirely.
/// Returns whether the release was observed before the deadline.
pub async fn wait_for_release_with(
    transport: &dyn IndexTransport,
    distribution: &str,
    version: &str,
    index_url: &str,
    options: &PollOptions,
) -> bool {
    let timeout = options.timeout;
    if timeout.is_zero() {
        return false;
    }

    let candidates = name_candidates(distribution);
    let deadline = Instant::now() + timeout;
    let mut delay = options
        .initial_delay
        .as_secs_f64()
        .min(timeout.as_secs_f64());
    let mut first_round = true;
    let mut attempt: u64 = 0;
    let mut last_heartbeat = Instant::now();

    println!(
        "⏳ リリース公開待ち: {} {} (最大 {}秒)",
        distribution,
        version,
        timeout.as_secs()
    );

    loop {
        // The index needs propagation time after an upload, so every probe
        // round is preceded by the (capped) backoff sleep, including the
        // first one.
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let remaining = deadline - now;
        let sleep_for = Duration::from_secs_f64(delay).min(remaining);
        tokio::time::sleep(sleep_for).await;
        if first_round {
            // The initial delay only covers propagation after the upload.
            // Retries back off from one second regardless of its value, so
            // a zero initial delay cannot pin the loop at zero sleep.
            first_round = false;
            delay = INITIAL_BACKOFF_SECS;
        } else {
            delay = (delay * 2.0).min(MAX_DELAY_SECS);
        }

        attempt += 1;
        for candidate in &candidates {
            if probe_candidate(transport, index_url, candidate, version).await {
                println!("✅ リリースを確認しました: {candidate} {version}");
                return true;
            }
        }

        let now = Instant::now();
        if now < deadline && now.duration_since(last_heartbeat) >= HEARTBEAT_INTERVAL {
            last_heartbeat = now;
            let seconds_remaining = ((deadline - now).as_secs_f64() * 10.0).round() / 10.0;
            let event = make_event(
                "pypi",
                "wait_release",
                "waiting",
                Some(attempt),
                Some(json!({
                    "distribution": distribution,
                    "version": version,
                    "seconds_remaining": seconds_remaining,
                })),
            );
            emit_event(&event);
        }
    }

    println!(
        "⚠️  リリースを確認できませんでした（タイムアウト）: {} {}",
        distribution, version
    );
    let event = make_event(
        "pypi",
        "wait_release",
        "timeout",
        Some(attempt),
        Some(json!({"distribution": distribution, "version": version})),
    );
    emit_event(&event);
    false
}

/// Wait for a release using a live HTTP client
pub async fn wait_for_release(
    distribution: &str,
    version: &str,
    index_url: &str,
    options: &PollOptions,
) -> bool {
    let client = HttpClient::new(PROBE_TIMEOUT);
    wait_for_release_with(&client, distribution, version, index_url, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::HttpError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubTransport {
        head_ok: Vec<&'static str>,
        releases: Option<serde_json::Value>,
        calls: Mutex<Vec<String>>,
    }

    impl StubTransport {
        fn new(head_ok: Vec<&'static str>, releases: Option<serde_json::Value>) -> Self {
            Self {
                head_ok,
                releases,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IndexTransport for StubTransport {
        async fn head(&self, url: &str, _headers: &[(String, String)]) -> Result<(), HttpError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.head_ok.iter().any(|ok| url == *ok) {
                Ok(())
            } else {
                Err(HttpError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            }
        }

        async fn get_json(&self, url: &str) -> Result<serde_json::Value, HttpError> {
            self.calls.lock().unwrap().push(url.to_string());
            match &self.releases {
                Some(doc) => Ok(doc.clone()),
                None => Err(HttpError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    #[test]
    fn test_name_candidates_dedup() {
        assert_eq!(
            name_candidates("x_make_demo_x"),
            vec!["x_make_demo_x", "x-make-demo-x"]
        );
        assert_eq!(name_candidates("plain"), vec!["plain"]);
    }

    #[tokio::test]
    async fn test_zero_timeout_returns_false_without_probing() {
        let stub = StubTransport::new(
            vec!["https://test.pypi.org/project/demo_pkg/1.0.0/"],
            None,
        );
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org/",
            &PollOptions {
                timeout: Duration::ZERO,
                ..PollOptions::default()
            },
        )
        .await;
        assert!(!found);
        assert!(stub.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_project_page_hit_short_circuits() {
        let stub = StubTransport::new(
            vec!["https://test.pypi.org/project/demo_pkg/1.0.0/"],
            None,
        );
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org/",
            &PollOptions {
                initial_delay: Duration::ZERO,
                ..PollOptions::default()
            },
        )
        .await;
        assert!(found);
        let calls = stub.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "https://test.pypi.org/project/demo_pkg/1.0.0/");
    }

    #[tokio::test]
    async fn test_bare_project_page_does_not_confirm_other_version() {
        // The project page without a version segment exists as soon as any
        // release does. It must not satisfy a wait for a newer version.
        let stub = StubTransport::new(
            vec![
                "https://test.pypi.org/project/demo_pkg/",
                "https://test.pypi.org/project/demo-pkg/",
            ],
            Some(serde_json::json!({"releases": {"1.0.0": [{}]}})),
        );
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "9.9.9",
            "https://test.pypi.org/",
            &PollOptions {
                timeout: Duration::from_secs(1),
                initial_delay: Duration::ZERO,
            },
        )
        .await;
        assert!(!found);
        let calls = stub.calls.lock().unwrap();
        assert!(
            calls
                .iter()
                .any(|url| url == "https://test.pypi.org/project/demo_pkg/9.9.9/")
        );
    }

    #[tokio::test]
    async fn test_hyphenated_candidate_is_tried() {
        let stub = StubTransport::new(
            vec!["https://test.pypi.org/project/demo-pkg/1.0.0/"],
            None,
        );
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org/",
            &PollOptions {
                initial_delay: Duration::ZERO,
                ..PollOptions::default()
            },
        )
        .await;
        assert!(found);
    }

    #[tokio::test]
    async fn test_json_fallback_checks_release_version() {
        let stub = StubTransport::new(
            Vec::new(),
            Some(serde_json::json!({"releases": {"1.0.0": [{}]}})),
        );
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org",
            &PollOptions {
                initial_delay: Duration::ZERO,
                ..PollOptions::default()
            },
        )
        .await;
        assert!(found);
    }

    #[tokio::test]
    async fn test_json_fallback_rejects_other_versions() {
        let stub = StubTransport::new(
            Vec::new(),
            Some(serde_json::json!({"releases": {"0.9.0": [{}]}})),
        );
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org/",
            &PollOptions {
                timeout: Duration::from_secs(1),
                ..PollOptions::default()
            },
        )
        .await;
        assert!(!found);
    }

    #[tokio::test]
    async fn test_initial_delay_capped_at_timeout() {
        let stub = StubTransport::new(Vec::new(), None);
        let start = Instant::now();
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org/",
            &PollOptions {
                timeout: Duration::from_secs(1),
                initial_delay: Duration::from_secs(60),
            },
        )
        .await;
        assert!(!found);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_initial_delay_backs_off_between_retries() {
        // After the first round the retry delay starts at one second even
        // when the initial delay was zero, keeping the attempt count bounded.
        let stub = StubTransport::new(Vec::new(), None);
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org/",
            &PollOptions {
                timeout: Duration::from_secs(1),
                initial_delay: Duration::ZERO,
            },
        )
        .await;
        assert!(!found);
        let calls = stub.calls.lock().unwrap().len();
        assert!(calls >= 4);
        assert!(calls <= 16, "expected bounded retries, saw {calls} probes");
    }

    #[test]
    fn test_default_poll_options() {
        let options = PollOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(120));
        assert_eq!(options.initial_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_returns_false() {
        let stub = StubTransport::new(Vec::new(), None);
        let start = Instant::now();
        let found = wait_for_release_with(
            &stub,
            "demo_pkg",
            "1.0.0",
            "https://test.pypi.org/",
            &PollOptions {
                timeout: Duration::from_secs(1),
                ..PollOptions::default()
            },
        )
        .await;
        assert!(!found);
        assert!(start.elapsed() >= Duration::from_secs(1));
        // both candidates probed by HEAD and JSON at least once
        assert!(stub.calls.lock().unwrap().len() >= 4);
    }
}
