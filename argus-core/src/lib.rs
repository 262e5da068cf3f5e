//! # Argus Core — Event model and shared infrastructure
//!
//! Foundation crate for the Argus security event pipeline. Everything that the
//! analysis layers agree on lives here: the event model and its wire tags, the
//! abstract clock, the named rolling-window registry, the bounded event store
//! with secondary indices, the error taxonomy, and the toml configuration.
//!
//! The analysis layers (`argus-anomaly`, `argus-alerting`, `argus-audit`)
//! link against this crate and never against each other's internals.

pub mod clock;
pub mod config;
pub mod error;
pub mod event_store;
pub mod types;
pub mod windows;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ArgusConfig;
pub use error::{ArgusError, ArgusResult};
pub use event_store::EventStore;
pub use types::{EventKind, Outcome, SecurityEvent, SeverityHint};
pub use windows::WindowRegistry;

/// Maximum serialized size of an event attribute map, in bytes. Events with a
/// larger payload are rejected at ingest with `SchemaInvalid`.
pub const MAX_ATTRIBUTES_BYTES: usize = 4096;

/// Maximum number of entries in an event attribute map.
pub const MAX_ATTRIBUTE_ENTRIES: usize = 32;
