use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::validate_request;
use crate::lifecycle::LifecycleManager;
use crate::models::{IncidentStatus, IncidentView, Principal};
use crate::SiaasResult;

/// Request type for siaas/incident/transition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransitionRequest {
    #[validate(nested)]
    pub principal: Principal,
    pub id: Uuid,
    /// Target status; must be the direct successor of the current one
    pub status: IncidentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub incident: IncidentView,
}

pub struct TransitionHandler {
    manager: Arc<LifecycleManager>,
}

impl TransitionHandler {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self { manager }
    }

    pub async fn handle_transition(&self, request: TransitionRequest) -> SiaasResult<TransitionResponse> {
        validate_request(&request)?;

        let incident = self
            .manager
            .transition(&request.principal, request.id, request.status)
            .await?;
        Ok(TransitionResponse {
            incident: incident.into(),
        })
    }
}
