//! Incident lifecycle manager.
//!
//! Owns the OPEN -> IN_PROGRESS -> CLOSED state machine. All incident writes go through
//! one async mutex held across the read/validate/append/persist sequence. The repository
//! call is the commit point and stays inside the guard, so a failed persist can never
//! leave a half-applied change visible. Reads do not take the guard. The lifecycle event
//! is numbered under the guard and broadcast after it is released, so a slow subscriber
//! can never stall a write.

pub mod sla;

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::authz::{self, AccessScope, UnzonedSupervisorPolicy};
use crate::broadcast::Broadcaster;
use crate::classifier::{self, payload};
use crate::models::{
    HistoryEntry, Incident, IncidentId, IncidentStatus, LifecycleEvent, Principal,
};
use crate::repository::{IncidentFilter, IncidentRepository};
use crate::{SiaasError, SiaasResult};

pub const DEFAULT_ZONE: &str = "GENERAL";

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Zone assigned when neither the payload nor the reporter supplies one
    pub default_zone: String,
    pub unzoned_supervisor: UnzonedSupervisorPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_zone: DEFAULT_ZONE.to_string(),
            unzoned_supervisor: UnzonedSupervisorPolicy::default(),
        }
    }
}

/// Result of an ingestion call
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    pub incident: Incident,
    /// `false` when an incident with the same client id already existed
    pub created: bool,
}

pub struct LifecycleManager {
    repository: Arc<dyn IncidentRepository>,
    broadcaster: Arc<Broadcaster>,
    write_lock: Mutex<()>,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(
        repository: Arc<dyn IncidentRepository>,
        broadcaster: Arc<Broadcaster>,
        config: LifecycleConfig,
    ) -> Self {
        info!(
            "Lifecycle manager ready (backend: {}, default zone: {})",
            repository.backend_name(),
            config.default_zone
        );
        Self {
            repository,
            broadcaster,
            write_lock: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Ingest a raw report. Retried reports carrying a known client id return the stored
    /// incident unchanged.
    pub async fn create(&self, raw: &Value, zone_hint: Option<&str>) -> SiaasResult<CreateOutcome> {
        let fields = raw
            .as_object()
            .ok_or_else(|| SiaasError::validation("report payload must be a JSON object", None))?;

        let incident_type = payload::first_text(fields, payload::TYPE_FIELDS)
            .ok_or_else(|| SiaasError::validation("incident type is required", Some("type")))?;
        let zone = self.resolve_zone(fields, zone_hint);
        let client_id = payload::first_text(fields, payload::CLIENT_ID_FIELDS);

        let guard = self.write_lock.lock().await;

        if let Some(client_id) = client_id.as_deref() {
            if let Some(existing) = self.repository.get_by_client_id(client_id).await? {
                debug!(
                    "Report {} already ingested as incident {}",
                    client_id, existing.id
                );
                return Ok(CreateOutcome {
                    incident: existing,
                    created: false,
                });
            }
        }

        let classification = classifier::classify(raw);
        let mut incident = Incident::open(incident_type, zone, classification.score, Utc::now());
        incident.client_id = client_id;
        incident.description = payload::first_text(fields, payload::DESCRIPTION_FIELDS);
        incident.location = payload::location(fields);
        incident.reported_at = payload::first_text(fields, payload::REPORTED_AT_FIELDS);
        if payload::has_partial_location(fields) {
            warn!(
                "Report for incident {} carries a single coordinate; location dropped",
                incident.id
            );
        }

        let incident = self.repository.create(incident).await.map_err(|e| {
            error!("Failed to persist new incident: {}", e);
            SiaasError::from(e)
        })?;
        // Sequence numbers follow commit order
        let event = LifecycleEvent::created(self.broadcaster.next_sequence(), incident.clone());
        drop(guard);

        info!(
            "Created incident {} ({}, zone {}, score {} {:?})",
            incident.id,
            incident.incident_type,
            incident.zone,
            incident.severity_score,
            classification.basis
        );

        self.broadcaster.on_lifecycle_event(&event).await;

        Ok(CreateOutcome {
            incident,
            created: true,
        })
    }

    /// Advance an incident by exactly one status step on behalf of `principal`
    pub async fn transition(
        &self,
        principal: &Principal,
        id: IncidentId,
        target: IncidentStatus,
    ) -> SiaasResult<Incident> {
        authz::require_dashboard_access(principal)?;

        let guard = self.write_lock.lock().await;

        let current = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| SiaasError::not_found(id))?;

        if !authz::can_transition(principal, &current, self.config.unzoned_supervisor) {
            return Err(SiaasError::not_authorized(format!(
                "{} may not operate on incidents in zone {}",
                principal.subject, current.zone
            )));
        }

        let from = current.status;
        if from.successor() != Some(target) {
            return Err(SiaasError::illegal_transition(from, target));
        }

        let mut updated = current;
        updated.status = target;
        updated.history.push(HistoryEntry {
            status: target,
            timestamp: Utc::now(),
            actor: principal.subject.clone(),
        });

        self.repository.update_status(&updated).await.map_err(|e| {
            error!("Failed to persist transition of incident {}: {}", id, e);
            SiaasError::from(e)
        })?;
        let event = LifecycleEvent::transitioned(
            self.broadcaster.next_sequence(),
            from,
            principal.subject.clone(),
            updated.clone(),
        );
        drop(guard);

        info!(
            "Incident {} moved {} -> {} by {}",
            id, from, target, principal.subject
        );

        self.broadcaster.on_lifecycle_event(&event).await;

        Ok(updated)
    }

    /// Single incident lookup, subject to the same visibility as the list
    pub async fn get(&self, principal: &Principal, id: IncidentId) -> SiaasResult<Incident> {
        authz::require_dashboard_access(principal)?;

        let incident = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| SiaasError::not_found(id))?;

        if !authz::can_view(principal, &incident, self.config.unzoned_supervisor) {
            return Err(SiaasError::not_authorized(format!(
                "incident {} is outside the zone of {}",
                id, principal.subject
            )));
        }
        Ok(incident)
    }

    /// Visible incidents in dashboard order; the status filter applies after zone filtering
    pub async fn list(
        &self,
        principal: &Principal,
        statuses: Option<&[IncidentStatus]>,
    ) -> SiaasResult<Vec<Incident>> {
        authz::require_dashboard_access(principal)?;

        let visible = self.visible(principal).await?;
        let mut incidents = authz::filter_by_status(visible, statuses);
        authz::sort_for_dashboard(&mut incidents);
        Ok(incidents)
    }

    /// Everything `principal` may see, unordered and unfiltered by status
    pub async fn visible(&self, principal: &Principal) -> SiaasResult<Vec<Incident>> {
        let scope = AccessScope::for_principal(principal, self.config.unzoned_supervisor);
        if scope == AccessScope::Nothing {
            return Ok(Vec::new());
        }

        let filter = IncidentFilter {
            zone: scope.zone().map(String::from),
            statuses: None,
        };
        let candidates = self.repository.list(&filter).await?;
        Ok(authz::visible_set(
            principal,
            candidates,
            self.config.unzoned_supervisor,
        ))
    }

    fn resolve_zone(
        &self,
        fields: &serde_json::Map<String, Value>,
        zone_hint: Option<&str>,
    ) -> String {
        payload::first_text(fields, payload::ZONE_FIELDS)
            .or_else(|| {
                zone_hint
                    .map(str::trim)
                    .filter(|zone| !zone.is_empty())
                    .map(String::from)
            })
            .unwrap_or_else(|| self.config.default_zone.clone())
    }
}
