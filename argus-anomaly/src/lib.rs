//! # Argus Anomaly — behavioral profiling and multi-signal scoring
//!
//! Maintains short-term behavioral profiles per actor and per source address,
//! runs every event through a set of independent pure detectors, and folds
//! the detector components into a single weighted anomaly score with a
//! severity mapping.
//!
//! Detectors never mutate state; the profile tracker is updated exactly once
//! per event by the orchestrator before scoring.

pub mod aggregator;
pub mod detectors;
pub mod geo;
pub mod profile;
pub mod types;

pub use aggregator::{AggregateOutcome, AnomalyAggregator, DetectorOutcome};
pub use detectors::{standard_detectors, Detector, DetectorContext};
pub use geo::{GeoResolver, NullGeoResolver, StaticGeoResolver};
pub use profile::{BehavioralProfile, ProfileKey, ProfileTracker, UpdateReceipt};
pub use types::{AnomalyScore, AnomalySeverity, DetectorId, ScoreComponent};
