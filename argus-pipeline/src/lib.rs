//! # Argus Pipeline — end-to-end ingest orchestration
//!
//! Composes the store, profiles, detectors, aggregator, rules, dispatcher
//! and audit log into one `ingest` entry point with a bounded detector pool.

pub mod orchestrator;
pub mod workers;

pub use orchestrator::{
    IngestOutcome, MaintenanceReport, Pipeline, PipelineBuilder, PipelineReport, RejectReason,
};
pub use workers::DetectorPool;
