//! Flags events arriving from an address the actor has never used.

use std::collections::HashMap;

use argus_core::error::ArgusResult;
use argus_core::types::SecurityEvent;

use super::{component, Detector, DetectorContext};
use crate::types::{DetectorId, ScoreComponent};

const NEW_SOURCE_RAW: f64 = 0.8;

pub struct UnusualSource;

impl Detector for UnusualSource {
    fn id(&self) -> DetectorId {
        DetectorId::UnusualSource
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        let (Some(addr), Some(actor)) = (&event.source_address, &event.actor_id) else {
            return Ok(None);
        };
        // Brand-new actors have no baseline; the first address is not
        // anomalous. The receipt records knowledge prior to this event.
        if !ctx.receipt.actor_had_sources || ctx.receipt.source_known_before {
            return Ok(None);
        }
        let details = HashMap::from([
            ("source_address".into(), addr.clone()),
            ("actor_id".into(), actor.clone()),
            (
                "known_sources".into(),
                ctx.profiles.known_sources(actor).join(","),
            ),
        ]);
        Ok(Some(component(
            self.id(),
            NEW_SOURCE_RAW,
            ctx.cfg.unusual_source_weight,
            details,
        )))
    }
}
