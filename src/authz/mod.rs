//! Authorization and visibility rules.
//!
//! Every read path, the transition path and the live feed derive their visibility from
//! [`AccessScope::for_principal`], so the zone boundary is defined in exactly one place.
//! Status filters are applied to the already zone-filtered set and can never widen it.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::models::{Incident, IncidentStatus, Principal, VisibilityTier};
use crate::{SiaasError, SiaasResult};

/// What a zone-scoped principal without an assigned zone may see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnzonedSupervisorPolicy {
    /// Treated as unrestricted, matching deployments that never assigned zones
    #[default]
    FailOpen,
    /// Sees nothing until a zone is assigned
    FailClosed,
}

/// Visibility predicate derived from a principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    Nothing,
    Zone(String),
    Everything,
}

impl AccessScope {
    pub fn for_principal(principal: &Principal, policy: UnzonedSupervisorPolicy) -> Self {
        match principal.tier() {
            VisibilityTier::NoAccess => AccessScope::Nothing,
            VisibilityTier::Global => AccessScope::Everything,
            VisibilityTier::ZoneScoped => match (principal.assigned_zone(), policy) {
                (Some(zone), _) => AccessScope::Zone(zone.to_string()),
                (None, UnzonedSupervisorPolicy::FailOpen) => AccessScope::Everything,
                (None, UnzonedSupervisorPolicy::FailClosed) => AccessScope::Nothing,
            },
        }
    }

    pub fn permits(&self, incident: &Incident) -> bool {
        match self {
            AccessScope::Nothing => false,
            AccessScope::Zone(zone) => incident.zone == *zone,
            AccessScope::Everything => true,
        }
    }

    /// Zone to push down into repository queries, if any
    pub fn zone(&self) -> Option<&str> {
        match self {
            AccessScope::Zone(zone) => Some(zone),
            _ => None,
        }
    }
}

/// Reject principals with no dashboard access at all
pub fn require_dashboard_access(principal: &Principal) -> SiaasResult<()> {
    if principal.tier() == VisibilityTier::NoAccess {
        return Err(SiaasError::not_authorized(format!(
            "role {} has no dashboard access",
            principal.role
        )));
    }
    Ok(())
}

pub fn can_view(principal: &Principal, incident: &Incident, policy: UnzonedSupervisorPolicy) -> bool {
    AccessScope::for_principal(principal, policy).permits(incident)
}

/// Operating on an incident requires the same zone membership as seeing it
pub fn can_transition(
    principal: &Principal,
    incident: &Incident,
    policy: UnzonedSupervisorPolicy,
) -> bool {
    can_view(principal, incident, policy)
}

pub fn visible_set(
    principal: &Principal,
    incidents: Vec<Incident>,
    policy: UnzonedSupervisorPolicy,
) -> Vec<Incident> {
    let scope = AccessScope::for_principal(principal, policy);
    incidents
        .into_iter()
        .filter(|incident| scope.permits(incident))
        .collect()
}

/// Keep only the requested statuses; an absent or empty filter keeps everything
pub fn filter_by_status(incidents: Vec<Incident>, statuses: Option<&[IncidentStatus]>) -> Vec<Incident> {
    match statuses {
        Some(statuses) if !statuses.is_empty() => incidents
            .into_iter()
            .filter(|incident| statuses.contains(&incident.status))
            .collect(),
        _ => incidents,
    }
}

/// Status priority, then severity score descending, then most recent first
pub fn sort_for_dashboard(incidents: &mut [Incident]) {
    incidents.sort_by_key(|incident| {
        (
            incident.status.priority(),
            Reverse(incident.severity_score),
            Reverse(incident.received_at),
        )
    });
}
