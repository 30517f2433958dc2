use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use super::memory::IncidentTable;
use super::{IncidentFilter, IncidentRepository, RepositoryError, RepositoryResult};
use crate::models::{Incident, IncidentId};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout of the snapshot file
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    incidents: Vec<Incident>,
}

/// Repository persisted as a single JSON snapshot.
///
/// Every mutation is applied to a copy of the table, written to a sibling temp file and
/// renamed over the snapshot. The in-memory table is replaced only after the rename
/// succeeds, so a failed write leaves both copies at the previous state. Writes queue on
/// `write_turn`; the table lock is only taken for the swap, so reads never wait on disk.
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    table: RwLock<IncidentTable>,
    write_turn: Mutex<()>,
}

impl FileRepository {
    /// Open the snapshot at `path`, starting empty when the file does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(RepositoryError::Unavailable(format!(
                        "unsupported snapshot version {} in {}",
                        snapshot.version,
                        path.display()
                    )));
                }
                IncidentTable::from_rows(snapshot.incidents)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IncidentTable::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Opened incident snapshot {} ({} incidents)",
            path.display(),
            table.len()
        );

        Ok(Self {
            path,
            table: RwLock::new(table),
            write_turn: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &IncidentTable) -> RepositoryResult<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            incidents: table.rows(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            error!("Failed to replace snapshot {}: {}", self.path.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Wrote {} incidents to {}", table.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl IncidentRepository for FileRepository {
    async fn create(&self, incident: Incident) -> RepositoryResult<Incident> {
        let _turn = self.write_turn.lock().await;
        let mut staged = self.table.read().await.clone();
        staged.insert(incident.clone())?;
        self.persist(&staged).await?;
        *self.table.write().await = staged;
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
        let _turn = self.write_turn.lock().await;
        let mut staged = self.table.read().await.clone();
        staged.replace_status(incident)?;
        self.persist(&staged).await?;
        *self.table.write().await = staged;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
