//! Manifest-driven batch publishing to a PyPI-style index
//!
//! The crate takes a declarative manifest (packages, versions, ancillary
//! files, publisher options), publishes each entry in order through a
//! pluggable publisher capability, classifies duplicate-release failures
//! as idempotent skips, and persists a structured run report for every
//! run. A release poller can wait until the index actually serves a
//! freshly uploaded version.

pub mod core;
pub mod orchestration;
pub mod publisher;
pub mod security;
pub mod validation;

pub use self::core::*;
pub use orchestration::{PublishFlow, PublishFlowOptions, PublishOutcome, RunReport, RunStatus};
pub use publisher::{Publisher, PublisherFactory, TwinePublisherFactory};
pub use security::prime_twine_credentials;
pub use validation::ManifestValidator;
