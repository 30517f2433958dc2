use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::handlers::validate_request;
use crate::lifecycle::LifecycleManager;
use crate::models::{IncidentView, Principal};
use crate::SiaasResult;

/// Request type for siaas/incident/sync
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncRequest {
    /// Raw report as captured by the mobile client
    pub payload: serde_json::Value,
    /// Zone of the submitting device, used when the report names none
    #[serde(default)]
    pub zone_hint: Option<String>,
    /// Submitting principal; anonymous submissions are accepted
    #[serde(default)]
    #[validate(nested)]
    pub principal: Option<Principal>,
}

/// Response type for siaas/incident/sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    /// `false` when the report was a retry of an already stored one
    pub created: bool,
    pub incident: IncidentView,
}

pub struct IngestHandler {
    manager: Arc<LifecycleManager>,
}

impl IngestHandler {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self { manager }
    }

    pub async fn handle_sync(&self, request: SyncRequest) -> SiaasResult<SyncResponse> {
        validate_request(&request)?;

        let zone_hint = request.zone_hint.as_deref().or_else(|| {
            request
                .principal
                .as_ref()
                .and_then(|principal| principal.assigned_zone())
        });
        debug!(
            "Sync from {} (zone hint {:?})",
            request
                .principal
                .as_ref()
                .map(|p| p.subject.as_str())
                .unwrap_or("anonymous"),
            zone_hint
        );

        let outcome = self.manager.create(&request.payload, zone_hint).await?;
        if !outcome.created {
            info!("Acknowledged retried report for incident {}", outcome.incident.id);
        }

        Ok(SyncResponse {
            created: outcome.created,
            incident: outcome.incident.into(),
        })
    }
}
