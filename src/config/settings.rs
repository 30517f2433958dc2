use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::authz::UnzonedSupervisorPolicy;
use crate::broadcast::BroadcastConfig;
use crate::jsonrpc::TransportConfig;
use crate::lifecycle::{LifecycleConfig, DEFAULT_ZONE};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/siaas.sock";

/// Server-wide configuration loaded from config.toml and environment variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub server: ServerConfig,
    pub incidents: IncidentsConfig,
    pub authorization: AuthorizationConfig,
    pub broadcast: BroadcastSettings,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub socket_path: Option<String>,
    pub log_level: String,
    /// Cap on concurrently registered live feed sessions
    pub max_concurrent_sessions: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            socket_path: Some(DEFAULT_SOCKET_PATH.to_string()),
            log_level: "info".to_string(),
            max_concurrent_sessions: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentsConfig {
    pub default_zone: String,
}

impl Default for IncidentsConfig {
    fn default() -> Self {
        Self {
            default_zone: DEFAULT_ZONE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub unzoned_supervisor: UnzonedSupervisorPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    pub session_buffer_size: u32,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            session_buffer_size: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File => "file",
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            other => anyhow::bail!("Unknown storage backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// JSON snapshot file, required by the file backend
    pub path: Option<PathBuf>,
}

impl ServerSettings {
    /// Defaults, overlaid by the config file (explicit path, or the default location when
    /// it exists), overlaid by `SIAAS_*` environment variables.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::load_from(path)?
            }
            None => {
                let path = Self::config_path();
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    info!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse a TOML settings file; missing sections and keys take their defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    /// Apply `SIAAS_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SIAAS_TRANSPORT") {
            self.server.transport = val;
        }
        if let Some(val) = lookup("SIAAS_SOCKET_PATH") {
            self.server.socket_path = Some(val);
        }
        if let Some(val) = lookup("SIAAS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Some(val) = lookup("SIAAS_MAX_SESSIONS") {
            self.server.max_concurrent_sessions = val
                .parse()
                .with_context(|| format!("SIAAS_MAX_SESSIONS is not a number: {}", val))?;
        }
        if let Some(val) = lookup("SIAAS_DEFAULT_ZONE") {
            self.incidents.default_zone = val;
        }
        if let Some(val) = lookup("SIAAS_STORAGE_BACKEND") {
            self.storage.backend = val.parse()?;
        }
        if let Some(val) = lookup("SIAAS_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(val));
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(custom_path) = std::env::var("SIAAS_CONFIG_PATH") {
            PathBuf::from(custom_path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("siaas")
                .join("config.toml")
        }
    }

    pub fn validate(&self) -> Result<()> {
        super::validation::validate_configuration(self, false)
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            default_zone: self.incidents.default_zone.trim().to_string(),
            unzoned_supervisor: self.authorization.unzoned_supervisor,
        }
    }

    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            session_buffer_size: self.broadcast.session_buffer_size as usize,
            max_sessions: self.server.max_concurrent_sessions as usize,
            unzoned_supervisor: self.authorization.unzoned_supervisor,
        }
    }

    pub fn transport_config(&self) -> Result<TransportConfig> {
        TransportConfig::from_settings(&self.server.transport, self.server.socket_path.as_deref())
    }
}
