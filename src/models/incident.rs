use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lowest score labelled HIGH
pub const HIGH_SCORE_THRESHOLD: i64 = 51;
/// Lowest score labelled MEDIUM
pub const MEDIUM_SCORE_THRESHOLD: i64 = 31;

/// Actor recorded on the first history entry of every incident
pub const SYSTEM_ACTOR: &str = "SYSTEM";

pub type IncidentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum IncidentStatus {
    Open,
    InProgress,
    Closed,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 3] = [
        IncidentStatus::Open,
        IncidentStatus::InProgress,
        IncidentStatus::Closed,
    ];

    /// The only status this one may advance to; `None` for the terminal state
    pub fn successor(self) -> Option<IncidentStatus> {
        match self {
            IncidentStatus::Open => Some(IncidentStatus::InProgress),
            IncidentStatus::InProgress => Some(IncidentStatus::Closed),
            IncidentStatus::Closed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successor().is_none()
    }

    /// Dashboard ordering rank: lower sorts first
    pub fn priority(self) -> u8 {
        match self {
            IncidentStatus::Open => 0,
            IncidentStatus::InProgress => 1,
            IncidentStatus::Closed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Open => "OPEN",
            IncidentStatus::InProgress => "IN_PROGRESS",
            IncidentStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    /// Accepts canonical names and the legacy dashboard vocabulary, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" | "nueva" | "pendiente" => Ok(IncidentStatus::Open),
            "in_progress" | "in-progress" | "en_atencion" => Ok(IncidentStatus::InProgress),
            "closed" | "cerrado" | "cerrada" => Ok(IncidentStatus::Closed),
            other => Err(format!(
                "unknown status '{}': expected OPEN, IN_PROGRESS or CLOSED",
                other
            )),
        }
    }
}

impl TryFrom<String> for IncidentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityLabel {
    Low,
    Medium,
    High,
}

impl SeverityLabel {
    /// The single mapping from score to label used by classification and every view
    pub fn from_score(score: i64) -> Self {
        if score >= HIGH_SCORE_THRESHOLD {
            SeverityLabel::High
        } else if score >= MEDIUM_SCORE_THRESHOLD {
            SeverityLabel::Medium
        } else {
            SeverityLabel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeverityLabel::Low => "LOW",
            SeverityLabel::Medium => "MEDIUM",
            SeverityLabel::High => "HIGH",
        }
    }
}

impl fmt::Display for SeverityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: IncidentStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
}

/// Stored incident record. The severity label is deliberately absent; see [`IncidentView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: IncidentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "type")]
    pub incident_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub severity_score: i64,
    pub zone: String,
    pub status: IncidentStatus,
    pub history: Vec<HistoryEntry>,
    pub received_at: DateTime<Utc>,
    /// Client-side report time, kept verbatim for display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<String>,
}

impl Incident {
    /// Build a freshly ingested OPEN incident with its creation history entry
    pub fn open(
        incident_type: String,
        zone: String,
        severity_score: i64,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: None,
            incident_type,
            description: None,
            location: None,
            severity_score,
            zone,
            status: IncidentStatus::Open,
            history: vec![HistoryEntry {
                status: IncidentStatus::Open,
                timestamp: received_at,
                actor: SYSTEM_ACTOR.to_string(),
            }],
            received_at,
            reported_at: None,
        }
    }

    pub fn severity_label(&self) -> SeverityLabel {
        SeverityLabel::from_score(self.severity_score)
    }

    /// History is non-empty and its last entry agrees with `status`
    pub fn is_consistent(&self) -> bool {
        self.history
            .last()
            .map(|entry| entry.status == self.status)
            .unwrap_or(false)
    }
}

/// Wire representation of an incident with its derived severity label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentView {
    #[serde(flatten)]
    pub incident: Incident,
    pub severity_label: SeverityLabel,
}

impl From<Incident> for IncidentView {
    fn from(incident: Incident) -> Self {
        let severity_label = incident.severity_label();
        Self {
            incident,
            severity_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_thresholds() {
        assert_eq!(SeverityLabel::from_score(0), SeverityLabel::Low);
        assert_eq!(SeverityLabel::from_score(30), SeverityLabel::Low);
        assert_eq!(SeverityLabel::from_score(31), SeverityLabel::Medium);
        assert_eq!(SeverityLabel::from_score(50), SeverityLabel::Medium);
        assert_eq!(SeverityLabel::from_score(51), SeverityLabel::High);
        assert_eq!(SeverityLabel::from_score(250), SeverityLabel::High);
    }

    #[test]
    fn test_status_successor_chain() {
        assert_eq!(IncidentStatus::Open.successor(), Some(IncidentStatus::InProgress));
        assert_eq!(IncidentStatus::InProgress.successor(), Some(IncidentStatus::Closed));
        assert!(IncidentStatus::Closed.is_terminal());
    }

    #[test]
    fn test_status_accepts_legacy_vocabulary() {
        assert_eq!("pendiente".parse::<IncidentStatus>(), Ok(IncidentStatus::Open));
        assert_eq!("EN_ATENCION".parse::<IncidentStatus>(), Ok(IncidentStatus::InProgress));
        assert_eq!("Cerrado".parse::<IncidentStatus>(), Ok(IncidentStatus::Closed));
        assert!("archived".parse::<IncidentStatus>().is_err());

        let parsed: IncidentStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(parsed, IncidentStatus::InProgress);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_open_incident_has_system_entry() {
        let incident = Incident::open("corte".into(), "GENERAL".into(), 10, Utc::now());
        assert_eq!(incident.history.len(), 1);
        assert_eq!(incident.history[0].actor, SYSTEM_ACTOR);
        assert!(incident.is_consistent());
    }

    #[test]
    fn test_view_carries_derived_label() {
        let incident = Incident::open("incendio".into(), "ZONE_1".into(), 60, Utc::now());
        let value = serde_json::to_value(IncidentView::from(incident)).unwrap();
        assert_eq!(value["severityLabel"], "HIGH");
        assert_eq!(value["type"], "incendio");
        assert_eq!(value["status"], "OPEN");
    }
}
