//! # Argus Alerting — rules, cooldowns, rate-limited dispatch
//!
//! The rule engine turns scored events into alerts; the dispatcher fans each
//! alert out to its channels on dedicated worker threads with per-channel
//! token budgets, bounded queues, and retry with exponential backoff.

pub mod channels;
pub mod dispatcher;
pub mod ratelimit;
pub mod rules;
pub mod types;

pub use channels::{AlertChannel, ChannelKind, DashboardChannel, SendOutcome};
pub use dispatcher::{AlertDispatcher, DispatchSink, DispatcherReport};
pub use ratelimit::RateLimiter;
pub use rules::{standard_rules, RuleEngine, RuleEngineReport};
pub use types::{Alert, AlertPriority, AlertRule, GroupBy, SendResult, SendStatus, Trigger};
