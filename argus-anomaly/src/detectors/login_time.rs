//! Flags successful logins at hours far from the actor's historical pattern.

use std::collections::HashMap;

use argus_core::error::ArgusResult;
use argus_core::types::{EventKind, SecurityEvent};

use super::{component, event_hour, Detector, DetectorContext};
use crate::types::{DetectorId, ScoreComponent};

pub struct UnusualLoginTime;

impl Detector for UnusualLoginTime {
    fn id(&self) -> DetectorId {
        DetectorId::UnusualLoginTime
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        if event.kind != EventKind::LoginSuccess {
            return Ok(None);
        }
        // Stats from before this login; a first-ever login has no baseline.
        let Some((mean, std)) = ctx.receipt.prior_hour_stats else {
            return Ok(None);
        };
        if std <= 0.0 {
            return Ok(None);
        }
        let hour = event_hour(event.timestamp_ms);
        let z = (hour - mean).abs() / std;
        if z <= 2.0 {
            return Ok(None);
        }
        let raw = (z / 4.0).min(1.0);
        let details = HashMap::from([
            ("current_hour".into(), format!("{hour}")),
            ("mean_hour".into(), format!("{mean:.2}")),
            ("std_hour".into(), format!("{std:.2}")),
            ("z_score".into(), format!("{z:.2}")),
        ]);
        Ok(Some(component(
            self.id(),
            raw,
            ctx.cfg.unusual_login_time_weight,
            details,
        )))
    }
}
