//! Incident repository collaborator.
//!
//! The lifecycle manager only needs create, get, get-by-client-id, list and status update;
//! whether the rows live in memory or on disk is invisible to it.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Incident, IncidentId, IncidentStatus};
use crate::SiaasError;

pub use file::FileRepository;
pub use memory::InMemoryRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("duplicate incident: {0}")]
    Duplicate(String),

    #[error("incident not found: {0}")]
    Missing(IncidentId),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage IO failure: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("storage encoding failure: {source}")]
    Encoding {
        #[from]
        source: serde_json::Error,
    },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<RepositoryError> for SiaasError {
    fn from(error: RepositoryError) -> Self {
        SiaasError::storage_unavailable(error.to_string())
    }
}

/// Row-level filter understood by every backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFilter {
    pub zone: Option<String>,
    pub statuses: Option<Vec<IncidentStatus>>,
}

impl IncidentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_zone(zone: impl Into<String>) -> Self {
        Self {
            zone: Some(zone.into()),
            statuses: None,
        }
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        let zone_ok = self
            .zone
            .as_deref()
            .map(|zone| incident.zone == zone)
            .unwrap_or(true);
        let status_ok = self
            .statuses
            .as_ref()
            .map(|statuses| statuses.contains(&incident.status))
            .unwrap_or(true);
        zone_ok && status_ok
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// Insert a new incident. Fails with `Duplicate` on a reused id or client id.
    async fn create(&self, incident: Incident) -> RepositoryResult<Incident>;

    async fn get(&self, id: IncidentId) -> RepositoryResult<Option<Incident>>;

    async fn get_by_client_id(&self, client_id: &str) -> RepositoryResult<Option<Incident>>;

    async fn list(&self, filter: &IncidentFilter) -> RepositoryResult<Vec<Incident>>;

    /// Replace the status and history of an existing incident
    async fn update_status(&self, incident: &Incident) -> RepositoryResult<()>;

    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_filter_matches_zone_and_status() {
        let incident = Incident::open("corte".into(), "ZONE_1".into(), 10, Utc::now());

        assert!(IncidentFilter::all().matches(&incident));
        assert!(IncidentFilter::in_zone("ZONE_1").matches(&incident));
        assert!(!IncidentFilter::in_zone("ZONE_2").matches(&incident));

        let closed_only = IncidentFilter {
            zone: None,
            statuses: Some(vec![IncidentStatus::Closed]),
        };
        assert!(!closed_only.matches(&incident));
    }

    #[test]
    fn test_repository_errors_surface_as_storage_unavailable() {
        let err: SiaasError = RepositoryError::Unavailable("disk full".into()).into();
        assert!(matches!(err, SiaasError::StorageUnavailable { .. }));
        assert!(err.to_string().contains("disk full"));
    }
}
