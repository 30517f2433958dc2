//! Configuration validation for the incident server

use anyhow::Result;
use std::path::Path;
use tracing::{error, info, warn};

use crate::authz::UnzonedSupervisorPolicy;
use crate::config::settings::{
    AuthorizationConfig, BroadcastSettings, IncidentsConfig, ServerConfig, ServerSettings,
    StorageBackend, StorageConfig,
};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Collects errors and warnings across every settings section
pub struct ConfigurationValidator {
    /// Fail on warnings as well as errors
    strict_mode: bool,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigurationValidator {
    pub fn new(strict_mode: bool) -> Self {
        Self {
            strict_mode,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn validate_settings(&mut self, settings: &ServerSettings) -> Result<()> {
        info!("Starting configuration validation");

        self.validate_server_config(&settings.server);
        self.validate_incidents_config(&settings.incidents);
        self.validate_authorization_config(&settings.authorization);
        self.validate_broadcast_config(&settings.broadcast);
        self.validate_storage_config(&settings.storage);

        self.print_validation_summary();

        if !self.errors.is_empty() {
            return Err(anyhow::anyhow!(
                "Configuration validation failed with {} errors: {}",
                self.errors.len(),
                self.errors.join("; ")
            ));
        }

        if self.strict_mode && !self.warnings.is_empty() {
            return Err(anyhow::anyhow!(
                "Configuration validation failed in strict mode with {} warnings",
                self.warnings.len()
            ));
        }

        Ok(())
    }

    fn validate_server_config(&mut self, server_config: &ServerConfig) {
        match server_config.transport.as_str() {
            "stdio" => {}
            "socket" => match server_config.socket_path.as_deref() {
                None | Some("") => self
                    .errors
                    .push("Socket transport requires socket_path to be set".to_string()),
                Some(path) => {
                    let parent_missing = Path::new(path)
                        .parent()
                        .map(|parent| !parent.as_os_str().is_empty() && !parent.exists())
                        .unwrap_or(false);
                    if parent_missing {
                        self.warnings.push(format!(
                            "Socket directory for {} does not exist and will be created",
                            path
                        ));
                    }
                }
            },
            other => {
                self.errors.push(format!(
                    "Invalid transport type: {}. Must be 'stdio' or 'socket'",
                    other
                ));
            }
        }

        if !LOG_LEVELS.contains(&server_config.log_level.to_lowercase().as_str()) {
            self.warnings.push(format!(
                "Non-standard log level: {}. Recommended: {}",
                server_config.log_level,
                LOG_LEVELS.join(", ")
            ));
        }

        if server_config.max_concurrent_sessions == 0 {
            self.errors
                .push("max_concurrent_sessions must be greater than 0".to_string());
        } else if server_config.max_concurrent_sessions > 1024 {
            self.warnings.push(format!(
                "max_concurrent_sessions is very high ({}). Every session holds its own event queue",
                server_config.max_concurrent_sessions
            ));
        }
    }

    fn validate_incidents_config(&mut self, incidents: &IncidentsConfig) {
        if incidents.default_zone.trim().is_empty() {
            self.errors
                .push("incidents.default_zone cannot be empty".to_string());
        }
    }

    fn validate_authorization_config(&mut self, authorization: &AuthorizationConfig) {
        if authorization.unzoned_supervisor == UnzonedSupervisorPolicy::FailOpen {
            info!("Zone supervisors without an assigned zone see every incident (fail_open)");
        }
    }

    fn validate_broadcast_config(&mut self, broadcast: &BroadcastSettings) {
        if broadcast.session_buffer_size == 0 {
            self.errors
                .push("broadcast.session_buffer_size must be greater than 0".to_string());
        } else if broadcast.session_buffer_size < 16 {
            self.warnings.push(
                "broadcast.session_buffer_size is very small (< 16). Slow dashboards will miss events"
                    .to_string(),
            );
        } else if broadcast.session_buffer_size > 65_536 {
            self.warnings.push(
                "broadcast.session_buffer_size is very large (> 65536). May use excessive memory"
                    .to_string(),
            );
        }
    }

    fn validate_storage_config(&mut self, storage: &StorageConfig) {
        match (storage.backend, storage.path.as_ref()) {
            (StorageBackend::File, None) => {
                self.errors
                    .push("File storage backend requires storage.path".to_string());
            }
            (StorageBackend::File, Some(path)) => {
                if path.is_dir() {
                    self.errors.push(format!(
                        "storage.path {} is a directory, expected a snapshot file",
                        path.display()
                    ));
                }
            }
            (StorageBackend::Memory, Some(path)) => {
                self.warnings.push(format!(
                    "storage.path {} is ignored by the memory backend; incidents are lost on restart",
                    path.display()
                ));
            }
            (StorageBackend::Memory, None) => {}
        }
    }

    fn print_validation_summary(&self) {
        if !self.warnings.is_empty() {
            warn!("Configuration warnings ({}):", self.warnings.len());
            for (i, warning) in self.warnings.iter().enumerate() {
                warn!("  {}: {}", i + 1, warning);
            }
        }

        if !self.errors.is_empty() {
            error!("Configuration errors ({}):", self.errors.len());
            for (i, error) in self.errors.iter().enumerate() {
                error!("  {}: {}", i + 1, error);
            }
        }

        info!(
            "Configuration validation completed with {} warnings and {} errors",
            self.warnings.len(),
            self.errors.len()
        );
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Quick validation function for use in main application
pub fn validate_configuration(settings: &ServerSettings, strict: bool) -> Result<()> {
    let mut validator = ConfigurationValidator::new(strict);
    validator.validate_settings(settings)
}
