//! Process bootstrap: settings → repository → broadcaster → lifecycle manager → JSON-RPC server

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::config::settings::{ServerSettings, StorageBackend};
use crate::jsonrpc::{register_siaas_methods, JsonRpcServer};
use crate::lifecycle::LifecycleManager;
use crate::repository::{FileRepository, InMemoryRepository, IncidentRepository};

/// Open the configured incident repository
pub async fn build_repository(settings: &ServerSettings) -> Result<Arc<dyn IncidentRepository>> {
    match settings.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryRepository::new())),
        StorageBackend::File => {
            let path = settings
                .storage
                .path
                .as_ref()
                .context("File storage backend requires storage.path")?;
            let repository = FileRepository::open(path)
                .await
                .with_context(|| format!("Failed to open incident snapshot {}", path.display()))?;
            Ok(Arc::new(repository))
        }
    }
}

/// Wire the lifecycle manager and its broadcaster from settings
pub async fn build_manager(settings: &ServerSettings) -> Result<Arc<LifecycleManager>> {
    let repository = build_repository(settings).await?;
    let broadcaster = Arc::new(Broadcaster::new(settings.broadcast_config()));
    Ok(Arc::new(LifecycleManager::new(
        repository,
        broadcaster,
        settings.lifecycle_config(),
    )))
}

/// Build a JSON-RPC server with every incident method registered
pub async fn build_server(
    settings: &ServerSettings,
    manager: Arc<LifecycleManager>,
) -> Result<JsonRpcServer> {
    let server = JsonRpcServer::new(settings.transport_config()?);
    register_siaas_methods(&server, manager).await;
    Ok(server)
}

/// Run the incident server until the transport closes or the process is interrupted
pub async fn start_server(settings: ServerSettings) -> Result<()> {
    settings.validate()?;

    let manager = build_manager(&settings).await?;
    let server = build_server(&settings, manager.clone()).await?;

    info!(
        "SIAAS incident server listening on {}",
        server.transport_description()
    );

    tokio::select! {
        result = server.start() => {
            result?;
            info!("Transport closed");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        }
    }

    let stats = manager.broadcaster().stats().await;
    info!(
        "SIAAS incident server stopped ({} live sessions, {} events delivered, {} dropped)",
        stats.active_sessions, stats.total_delivered, stats.total_dropped
    );
    Ok(())
}
