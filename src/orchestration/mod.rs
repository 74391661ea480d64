//! Orchestration layer for manifest-driven publishing
//!
//! This module provides the high-level components of a publish run:
//! ancillary resolution, manifest entry processing, the publish flow
//! itself, release availability polling, and run report assembly.

pub mod ancillary_resolver;
pub mod manifest_processor;
pub mod publish_flow;
pub mod release_poller;
pub mod run_report;

// Re-export main types for convenience
pub use ancillary_resolver::{
    collect_manifest_ancillaries, collect_publish_ancillaries, load_ancillary_allowlist,
};
pub use manifest_processor::{build_publish_context, PublishContext};
pub use publish_flow::{PublishFlow, PublishFlowOptions, PublishOutcome, DEFAULT_INDEX_URL};
pub use release_poller::{wait_for_release, wait_for_release_with, PollOptions};
pub use run_report::{
    write_run_report, EntryResult, EntryStatus, PublishedArtifact, RunReport, RunReportBuilder,
    RunStatus,
};
