use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::validate_request;
use crate::lifecycle::{sla, LifecycleManager};
use crate::models::{IncidentStatus, IncidentView, Principal};
use crate::SiaasResult;

/// Request type for siaas/incident/list
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListIncidentsRequest {
    #[validate(nested)]
    pub principal: Principal,
    /// Restrict to these statuses; absent or empty means all
    #[serde(default)]
    pub statuses: Option<Vec<IncidentStatus>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListIncidentsResponse {
    pub incidents: Vec<IncidentView>,
    pub count: usize,
}

/// Request type for siaas/incident/get
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GetIncidentRequest {
    #[validate(nested)]
    pub principal: Principal,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetIncidentResponse {
    pub incident: IncidentView,
    pub sla: sla::SlaBreakdown,
}

/// Snapshot queries used by dashboards on load, on reconnect and on every poll
pub struct QueryHandler {
    manager: Arc<LifecycleManager>,
}

impl QueryHandler {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self { manager }
    }

    pub async fn handle_list(&self, request: ListIncidentsRequest) -> SiaasResult<ListIncidentsResponse> {
        validate_request(&request)?;

        let incidents = self
            .manager
            .list(&request.principal, request.statuses.as_deref())
            .await?;
        debug!(
            "Listing {} incidents for {}",
            incidents.len(),
            request.principal.subject
        );

        let incidents: Vec<IncidentView> = incidents.into_iter().map(IncidentView::from).collect();
        Ok(ListIncidentsResponse {
            count: incidents.len(),
            incidents,
        })
    }

    pub async fn handle_get(&self, request: GetIncidentRequest) -> SiaasResult<GetIncidentResponse> {
        validate_request(&request)?;

        let incident = self.manager.get(&request.principal, request.id).await?;
        let sla = sla::breakdown(&incident);
        Ok(GetIncidentResponse {
            incident: incident.into(),
            sla,
        })
    }
}
