//! Flags events whose source resolves to a denylisted country.

use std::collections::HashMap;

use argus_core::error::ArgusResult;
use argus_core::types::SecurityEvent;

use super::{component, Detector, DetectorContext};
use crate::profile::ProfileKey;
use crate::types::{DetectorId, ScoreComponent};

const DENYLISTED_RAW: f64 = 0.8;

pub struct GeographicAnomaly;

impl Detector for GeographicAnomaly {
    fn id(&self) -> DetectorId {
        DetectorId::GeographicAnomaly
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        let Some(addr) = &event.source_address else {
            return Ok(None);
        };
        // Resolution for this event wins; fall back to the profile's last
        // known country when the resolver had nothing.
        let country = match &ctx.receipt.country {
            Some(c) => Some(c.clone()),
            None => ctx.profiles.country_last_seen(ProfileKey::Source(addr)),
        };
        let Some(country) = country else {
            return Ok(None);
        };
        if !ctx.cfg.geo_denylist.iter().any(|c| c == &country) {
            return Ok(None);
        }
        let details = HashMap::from([
            ("source_address".into(), addr.clone()),
            ("country_code".into(), country),
        ]);
        Ok(Some(component(
            self.id(),
            DENYLISTED_RAW,
            ctx.cfg.geographic_weight,
            details,
        )))
    }
}
