//! # Argus Audit — append-only record, statistics, export
//!
//! Every ingested event and every resolved alert lands here. Statistics are
//! materialized on append; export streams page by page.

pub mod backend;
pub mod export;
pub mod log;
pub mod types;

pub use backend::{AuditBackend, MemoryBackend};
pub use export::{export_events, ExportFormat};
pub use log::AuditLog;
pub use types::{AlertFilter, DayStats, EventFilter, Statistics, MAX_PAGE_LIMIT};
