//! Input contract validation

pub mod manifest_validator;

// Re-export main types for convenience
pub use manifest_validator::{ManifestValidator, ValidationResult};
