//! Twine credential selection and token masking
//!
//! Uploads authenticate through environment variables only: a token is
//! resolved from the configured variable (falling back to
//! `TWINE_API_TOKEN`) and installed as the standard twine trio. An
//! existing username/password pair is never clobbered when no token is
//! present. Token values stay wrapped in `SecretString` and are masked in
//! anything user-facing.

use lazy_static::lazy_static;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::env;

/// Fallback token variable when no explicit one is configured
pub const FALLBACK_TOKEN_ENV: &str = "TWINE_API_TOKEN";

lazy_static! {
    /// PyPI API tokens are "pypi-" plus a long base64-ish tail
    static ref TOKEN_PATTERN: Regex =
        Regex::new(r"pypi-[A-Za-z0-9._\-]{8,}").expect("valid token pattern");
}

/// Resolve the upload token from the environment
///
/// Checks the named variable first, then `TWINE_API_TOKEN`. Empty and
/// whitespace-only values count as absent. Returns the winning variable
/// name together with the secret.
pub fn resolve_token(token_env: Option<&str>) -> Option<(String, SecretString)> {
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(name) = token_env {
        candidates.push(name);
    }
    if token_env != Some(FALLBACK_TOKEN_ENV) {
        candidates.push(FALLBACK_TOKEN_ENV);
    }

    for name in candidates {
        if let Ok(value) = env::var(name) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some((name.to_string(), SecretString::from(trimmed.to_string())));
            }
        }
    }
    None
}

/// Install the twine credential trio from the resolved token
///
/// With a token: `TWINE_API_TOKEN`, `TWINE_USERNAME=__token__` and
/// `TWINE_PASSWORD` are all set. Without one, an already-present
/// username/password pair is left untouched and reported as the source.
/// Returns the environment variable the credentials came from, or `None`
/// when nothing usable exists.
pub fn prime_twine_credentials(token_env: Option<&str>) -> Option<String> {
    if let Some((name, token)) = resolve_token(token_env) {
        // Safety: the process is single-threaded at priming time; the CLI
        // primes credentials before spawning any worker.
        unsafe {
            env::set_var(FALLBACK_TOKEN_ENV, token.expose_secret());
            env::set_var("TWINE_USERNAME", "__token__");
            env::set_var("TWINE_PASSWORD", token.expose_secret());
        }
        println!("🔑 認証情報を設定しました（{} から取得）", name);
        return Some(name);
    }

    let has_pair = env::var("TWINE_USERNAME").map(|v| !v.trim().is_empty()).unwrap_or(false)
        && env::var("TWINE_PASSWORD").map(|v| !v.trim().is_empty()).unwrap_or(false);
    if has_pair {
        println!("🔑 既存の TWINE_USERNAME/TWINE_PASSWORD を使用します");
        return Some("TWINE_USERNAME".to_string());
    }
    None
}

/// Mask a token for display, keeping only a short recognizable prefix
pub fn mask_token(token: &str) -> String {
    if token.len() <= 10 {
        return "***".to_string();
    }
    format!("{}***", &token[..10])
}

/// Replace every PyPI-shaped token occurrence in a text with its mask
pub fn mask_tokens_in_text(text: &str) -> String {
    TOKEN_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| mask_token(&caps[0]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize these tests.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_twine_env() {
        for name in [
            FALLBACK_TOKEN_ENV,
            "TWINE_USERNAME",
            "TWINE_PASSWORD",
            "CUSTOM_TOKEN_ENV",
        ] {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    fn test_resolve_prefers_named_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_twine_env();
        unsafe {
            env::set_var("CUSTOM_TOKEN_ENV", "pypi-custom-token-value");
            env::set_var(FALLBACK_TOKEN_ENV, "pypi-fallback-token-value");
        }

        let (name, token) = resolve_token(Some("CUSTOM_TOKEN_ENV")).unwrap();
        assert_eq!(name, "CUSTOM_TOKEN_ENV");
        assert_eq!(token.expose_secret(), "pypi-custom-token-value");
        clear_twine_env();
    }

    #[test]
    fn test_resolve_falls_back_and_trims() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_twine_env();
        unsafe { env::set_var(FALLBACK_TOKEN_ENV, "  pypi-fallback-token-value  ") };

        let (name, token) = resolve_token(Some("CUSTOM_TOKEN_ENV")).unwrap();
        assert_eq!(name, FALLBACK_TOKEN_ENV);
        assert_eq!(token.expose_secret(), "pypi-fallback-token-value");
        clear_twine_env();
    }

    #[test]
    fn test_resolve_ignores_blank_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_twine_env();
        unsafe { env::set_var(FALLBACK_TOKEN_ENV, "   ") };
        assert!(resolve_token(None).is_none());
        clear_twine_env();
    }

    #[test]
    fn test_prime_installs_token_trio() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_twine_env();
        unsafe { env::set_var("CUSTOM_TOKEN_ENV", "pypi-prime-token-value") };

        let source = prime_twine_credentials(Some("CUSTOM_TOKEN_ENV"));
        assert_eq!(source.as_deref(), Some("CUSTOM_TOKEN_ENV"));
        assert_eq!(
            env::var(FALLBACK_TOKEN_ENV).unwrap(),
            "pypi-prime-token-value"
        );
        assert_eq!(env::var("TWINE_USERNAME").unwrap(), "__token__");
        assert_eq!(env::var("TWINE_PASSWORD").unwrap(), "pypi-prime-token-value");
        clear_twine_env();
    }

    #[test]
    fn test_prime_preserves_existing_pair() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_twine_env();
        unsafe {
            env::set_var("TWINE_USERNAME", "sanae");
            env::set_var("TWINE_PASSWORD", "hunter2");
        }

        let source = prime_twine_credentials(None);
        assert_eq!(source.as_deref(), Some("TWINE_USERNAME"));
        assert_eq!(env::var("TWINE_USERNAME").unwrap(), "sanae");
        assert_eq!(env::var("TWINE_PASSWORD").unwrap(), "hunter2");
        clear_twine_env();
    }

    #[test]
    fn test_prime_with_nothing_available() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_twine_env();
        assert!(prime_twine_credentials(None).is_none());
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("pypi-AgEIcHlwaS5vcmc"), "pypi-AgEIc***");
        assert_eq!(mask_token("short"), "***");
    }

    #[test]
    fn test_mask_tokens_in_text() {
        let text = "upload failed for token pypi-AgEIcHlwaS5vcmcabcdef (401)";
        let masked = mask_tokens_in_text(text);
        assert!(!masked.contains("pypi-AgEIcHlwaS5vcmcabcdef"));
        assert!(masked.contains("pypi-AgEIc***"));
        assert!(masked.contains("(401)"));
    }
}
