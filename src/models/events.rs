use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::incident::{Incident, IncidentStatus, IncidentView};

/// Lifecycle change pushed to live feed sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub sequence_number: u64,
    pub emitted_at: DateTime<Utc>,
    pub actor: String,
    pub kind: LifecycleEventKind,
    pub incident: IncidentView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Created,
    Transitioned {
        from: IncidentStatus,
        to: IncidentStatus,
    },
}

impl LifecycleEvent {
    pub fn created(sequence_number: u64, incident: Incident) -> Self {
        Self {
            sequence_number,
            emitted_at: Utc::now(),
            actor: crate::models::SYSTEM_ACTOR.to_string(),
            kind: LifecycleEventKind::Created,
            incident: incident.into(),
        }
    }

    pub fn transitioned(
        sequence_number: u64,
        from: IncidentStatus,
        actor: impl Into<String>,
        incident: Incident,
    ) -> Self {
        let to = incident.status;
        Self {
            sequence_number,
            emitted_at: Utc::now(),
            actor: actor.into(),
            kind: LifecycleEventKind::Transitioned { from, to },
            incident: incident.into(),
        }
    }

    pub fn incident(&self) -> &Incident {
        &self.incident.incident
    }
}
