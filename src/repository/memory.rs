use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{IncidentFilter, IncidentRepository, RepositoryError, RepositoryResult};
use crate::models::{Incident, IncidentId};

/// Incident rows with a client id index
#[derive(Debug, Clone, Default)]
pub(crate) struct IncidentTable {
    rows: HashMap<IncidentId, Incident>,
    by_client_id: HashMap<String, IncidentId>,
}

impl IncidentTable {
    pub(crate) fn from_rows(rows: Vec<Incident>) -> RepositoryResult<Self> {
        let mut table = Self::default();
        for incident in rows {
            table.insert(incident)?;
        }
        Ok(table)
    }

    pub(crate) fn insert(&mut self, incident: Incident) -> RepositoryResult<()> {
        if self.rows.contains_key(&incident.id) {
            return Err(RepositoryError::Duplicate(incident.id.to_string()));
        }
        if let Some(client_id) = &incident.client_id {
            if self.by_client_id.contains_key(client_id) {
                return Err(RepositoryError::Duplicate(client_id.clone()));
            }
            self.by_client_id.insert(client_id.clone(), incident.id);
        }
        self.rows.insert(incident.id, incident);
        Ok(())
    }

    pub(crate) fn replace_status(&mut self, incident: &Incident) -> RepositoryResult<()> {
        let row = self
            .rows
            .get_mut(&incident.id)
            .ok_or(RepositoryError::Missing(incident.id))?;
        row.status = incident.status;
        row.history = incident.history.clone();
        Ok(())
    }

    pub(crate) fn get(&self, id: &IncidentId) -> Option<&Incident> {
        self.rows.get(id)
    }

    pub(crate) fn get_by_client_id(&self, client_id: &str) -> Option<&Incident> {
        self.by_client_id
            .get(client_id)
            .and_then(|id| self.rows.get(id))
    }

    /// Matching rows, oldest first
    pub(crate) fn select(&self, filter: &IncidentFilter) -> Vec<Incident> {
        let mut selected: Vec<Incident> = self
            .rows
            .values()
            .filter(|incident| filter.matches(incident))
            .cloned()
            .collect();
        selected.sort_by_key(|incident| incident.received_at);
        selected
    }

    pub(crate) fn rows(&self) -> Vec<Incident> {
        self.select(&IncidentFilter::all())
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Volatile repository; the process-local table is the only copy
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    table: RwLock<IncidentTable>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IncidentRepository for InMemoryRepository {
    async fn create(&self, incident: Incident) -> RepositoryResult<Incident> {
        let mut table = self.table.write().await;
        table.insert(incident.clone())?;
        debug!("Stored incident {} in memory", incident.id);
        Ok(incident)
    }

    async fn get(&self, id: IncidentId) -> RepositoryResult<Option<Incident>> {
        Ok(self.table.read().await.get(&id).cloned())
    }

    async fn get_by_client_id(&self, client_id: &str) -> RepositoryResult<Option<Incident>> {
        Ok(self.table.read().await.get_by_client_id(client_id).cloned())
    }

    async fn list(&self, filter: &IncidentFilter) -> RepositoryResult<Vec<Incident>> {
        Ok(self.table.read().await.select(filter))
    }

    async fn update_status(&self, incident: &Incident) -> RepositoryResult<()> {
        self.table.write().await.replace_status(incident)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
