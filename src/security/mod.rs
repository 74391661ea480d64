//! Credential handling and token hygiene

pub mod credentials;

// Re-export main types for convenience
pub use credentials::{
    mask_token, mask_tokens_in_text, prime_twine_credentials, resolve_token, FALLBACK_TOKEN_ENV,
};
