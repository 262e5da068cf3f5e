//! Keyword scoring over the agent fingerprint and the request target.

use std::collections::HashMap;

use argus_core::error::ArgusResult;
use argus_core::types::SecurityEvent;

use super::{component, Detector, DetectorContext};
use crate::types::{DetectorId, ScoreComponent};

/// Automation fingerprints; each hit adds 0.3.
const AGENT_KEYWORDS: &[&str] = &["bot", "crawler", "scraper", "spider", "curl", "wget"];
/// Sensitive target substrings; each hit adds 0.5.
const TARGET_KEYWORDS: &[&str] = &["admin", "config", "debug", "test"];

const AGENT_HIT: f64 = 0.3;
const TARGET_HIT: f64 = 0.5;

pub struct SuspiciousPattern;

impl Detector for SuspiciousPattern {
    fn id(&self) -> DetectorId {
        DetectorId::SuspiciousPattern
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        let agent = event
            .agent_fingerprint
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let target = event.target.as_deref().unwrap_or_default().to_lowercase();

        let agent_hits = AGENT_KEYWORDS.iter().filter(|k| agent.contains(**k)).count();
        let target_hits = TARGET_KEYWORDS
            .iter()
            .filter(|k| target.contains(**k))
            .count();

        let raw = (agent_hits as f64 * AGENT_HIT + target_hits as f64 * TARGET_HIT).min(1.0);
        if raw <= 0.0 {
            return Ok(None);
        }
        let details = HashMap::from([
            ("agent_hits".into(), agent_hits.to_string()),
            ("target_hits".into(), target_hits.to_string()),
        ]);
        Ok(Some(component(
            self.id(),
            raw,
            ctx.cfg.suspicious_pattern_weight,
            details,
        )))
    }
}
