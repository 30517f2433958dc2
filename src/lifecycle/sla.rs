//! SLA derivation from incident history. Nothing here is stored; every figure is
//! recomputed from the audit trail on demand.

use serde::{Deserialize, Serialize};

use crate::models::{HistoryEntry, Incident, IncidentStatus};

/// Elapsed time between two consecutive history entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDuration {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
    pub seconds: i64,
    pub minutes: f64,
}

/// SLA detail attached to a single incident view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaBreakdown {
    /// Total resolution time; `None` until the incident is CLOSED
    pub total_minutes: Option<f64>,
    pub steps: Vec<StepDuration>,
}

fn diff_seconds(a: &HistoryEntry, b: &HistoryEntry) -> i64 {
    (b.timestamp - a.timestamp).num_seconds().max(0)
}

fn to_minutes(seconds: i64) -> f64 {
    seconds as f64 / 60.0
}

/// First-to-last history span in seconds, for CLOSED incidents only
pub fn resolution_seconds(incident: &Incident) -> Option<i64> {
    if incident.status != IncidentStatus::Closed {
        return None;
    }
    let (first, last) = (incident.history.first()?, incident.history.last()?);
    Some(diff_seconds(first, last))
}

pub fn step_durations(incident: &Incident) -> Vec<StepDuration> {
    incident
        .history
        .windows(2)
        .map(|pair| {
            let seconds = diff_seconds(&pair[0], &pair[1]);
            StepDuration {
                from: pair[0].status,
                to: pair[1].status,
                seconds,
                minutes: to_minutes(seconds),
            }
        })
        .collect()
}

pub fn breakdown(incident: &Incident) -> SlaBreakdown {
    SlaBreakdown {
        total_minutes: resolution_seconds(incident).map(to_minutes),
        steps: step_durations(incident),
    }
}

/// Mean resolution time over the CLOSED members of `incidents`, rounded to whole minutes.
/// Zero when the set holds no CLOSED incident.
pub fn average_sla_minutes<'a>(incidents: impl IntoIterator<Item = &'a Incident>) -> i64 {
    let totals: Vec<i64> = incidents.into_iter().filter_map(resolution_seconds).collect();
    if totals.is_empty() {
        return 0;
    }
    let mean_seconds = totals.iter().sum::<i64>() as f64 / totals.len() as f64;
    (mean_seconds / 60.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn closed_at(minutes: [u32; 3]) -> Incident {
        let at = |m: u32| Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap();
        let mut incident = Incident::open("corte".into(), "ZONE_1".into(), 60, at(minutes[0]));
        for (status, minute) in [
            (IncidentStatus::InProgress, minutes[1]),
            (IncidentStatus::Closed, minutes[2]),
        ] {
            incident.status = status;
            incident.history.push(HistoryEntry {
                status,
                timestamp: at(minute),
                actor: "admin".into(),
            });
        }
        incident
    }

    #[test]
    fn test_resolution_and_steps() {
        let incident = closed_at([0, 5, 20]);
        let sla = breakdown(&incident);

        assert_eq!(sla.total_minutes, Some(20.0));
        let steps: Vec<f64> = sla.steps.iter().map(|s| s.minutes).collect();
        assert_eq!(steps, vec![5.0, 15.0]);
        assert_eq!(sla.steps[0].from, IncidentStatus::Open);
        assert_eq!(sla.steps[1].to, IncidentStatus::Closed);
    }

    #[test]
    fn test_open_incident_has_no_total() {
        let incident = Incident::open("corte".into(), "ZONE_1".into(), 10, Utc::now());
        assert_eq!(resolution_seconds(&incident), None);
        assert!(step_durations(&incident).is_empty());
    }

    #[test]
    fn test_average_rounds_to_minutes() {
        let a = closed_at([0, 5, 20]);
        let b = closed_at([0, 1, 9]);
        let open = Incident::open("x".into(), "Z".into(), 10, Utc::now());

        // (20 + 9) / 2 = 14.5, rounded half away from zero
        assert_eq!(average_sla_minutes([&a, &b, &open]), 15);
    }

    #[test]
    fn test_average_without_closed_is_zero() {
        let open = Incident::open("x".into(), "Z".into(), 10, Utc::now());
        assert_eq!(average_sla_minutes([&open]), 0);
        assert_eq!(average_sla_minutes(Vec::<&Incident>::new()), 0);
    }
}
