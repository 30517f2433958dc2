use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use crate::authz;
use crate::handlers::validate_request;
use crate::lifecycle::{sla, LifecycleManager};
use crate::models::{Incident, IncidentStatus, Principal, SeverityLabel};
use crate::SiaasResult;

/// Request type for siaas/metrics/summary
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MetricsRequest {
    #[validate(nested)]
    pub principal: Principal,
}

/// Aggregates over the principal's visible set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub by_status: BTreeMap<IncidentStatus, usize>,
    pub by_severity: BTreeMap<SeverityLabel, usize>,
    pub average_sla_minutes: i64,
    pub total: usize,
}

impl MetricsSummary {
    /// Every status and label is present, zero-filled
    pub fn from_incidents(incidents: &[Incident]) -> Self {
        let mut by_status: BTreeMap<IncidentStatus, usize> =
            IncidentStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_severity: BTreeMap<SeverityLabel, usize> =
            [SeverityLabel::Low, SeverityLabel::Medium, SeverityLabel::High]
                .iter()
                .map(|l| (*l, 0))
                .collect();

        for incident in incidents {
            *by_status.entry(incident.status).or_default() += 1;
            *by_severity.entry(incident.severity_label()).or_default() += 1;
        }

        Self {
            by_status,
            by_severity,
            average_sla_minutes: sla::average_sla_minutes(incidents),
            total: incidents.len(),
        }
    }
}

pub struct MetricsHandler {
    manager: Arc<LifecycleManager>,
}

impl MetricsHandler {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self { manager }
    }

    pub async fn handle_summary(&self, request: MetricsRequest) -> SiaasResult<MetricsSummary> {
        validate_request(&request)?;
        authz::require_dashboard_access(&request.principal)?;

        let visible = self.manager.visible(&request.principal).await?;
        Ok(MetricsSummary::from_incidents(&visible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::lifecycle::LifecycleConfig;
    use crate::models::Role;
    use crate::repository::InMemoryRepository;
    use crate::SiaasError;
    use serde_json::json;

    #[tokio::test]
    async fn test_summary_counts_visible_set_only() {
        let manager = Arc::new(LifecycleManager::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(Broadcaster::default()),
            LifecycleConfig::default(),
        ));
        for (zone, text) in [("ZONE_1", "grave"), ("ZONE_1", "fuga"), ("ZONE_2", "grave")] {
            manager
                .create(&json!({"tipo": "x", "zona": zone, "descripcion": text}), None)
                .await
                .unwrap();
        }
        let handler = MetricsHandler::new(manager);

        let summary = handler
            .handle_summary(MetricsRequest {
                principal: Principal::new("ana", Role::ZoneSupervisor, Some("ZONE_1")),
            })
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_status[&IncidentStatus::Open], 2);
        assert_eq!(summary.by_status[&IncidentStatus::Closed], 0);
        assert_eq!(summary.by_severity[&SeverityLabel::High], 1);
        assert_eq!(summary.by_severity[&SeverityLabel::Medium], 1);
        assert_eq!(summary.average_sla_minutes, 0);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["by_status"]["IN_PROGRESS"], 0);
        assert_eq!(value["by_severity"]["HIGH"], 1);

        let reporter = handler
            .handle_summary(MetricsRequest {
                principal: Principal::new("pepe", Role::FieldReporter, Some("ZONE_1")),
            })
            .await;
        assert!(matches!(reporter, Err(SiaasError::NotAuthorized { .. })));
    }
}
