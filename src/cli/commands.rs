//! CLI command implementations.

use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};

use crate::classifier;
use crate::config::{ConfigurationValidator, ServerSettings};
use crate::server::start_server;

use super::utils::{apply_serve_flags, load_payload, load_settings};

/// Start the incident server
pub async fn serve(
    config_path: Option<PathBuf>,
    transport: Option<String>,
    socket_path: Option<String>,
    log_level: Option<String>,
) -> Result<()> {
    let mut settings = load_settings(config_path.as_deref())?;
    apply_serve_flags(&mut settings, transport, socket_path, log_level);

    info!(
        "Starting SIAAS server with {} transport ({} storage)",
        settings.server.transport,
        settings.storage.backend.as_str()
    );
    start_server(settings).await
}

/// Initialize default configuration
pub async fn init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(ServerSettings::config_path);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            config_path
        );
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let toml_content = toml::to_string_pretty(&ServerSettings::default())?;
    std::fs::write(&config_path, toml_content)?;

    println!("✓ Configuration initialized at {:?}", config_path);
    Ok(())
}

/// Print and/or validate the effective configuration
pub async fn show_config(
    config_path: Option<PathBuf>,
    show: bool,
    validate: bool,
    strict: bool,
) -> Result<()> {
    let settings = load_settings(config_path.as_deref())?;

    if show || !validate {
        println!("{}", toml::to_string_pretty(&settings)?);
    }

    if validate {
        let mut validator = ConfigurationValidator::new(strict);
        match validator.validate_settings(&settings) {
            Ok(()) => println!("✓ Configuration is valid"),
            Err(e) => {
                for warning in validator.warnings() {
                    println!("  warning: {}", warning);
                }
                for problem in validator.errors() {
                    println!("  error: {}", problem);
                }
                error!("Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Classify a payload without a running server
pub async fn classify(payload_file: Option<PathBuf>, payload_json: Option<String>) -> Result<()> {
    let payload = load_payload(payload_file, payload_json)?;
    let classification = classifier::classify(&payload);
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}

/// Show version information
pub async fn version() -> Result<()> {
    println!("SIAAS {}", env!("CARGO_PKG_VERSION"));
    println!("Built with Rust {}", rustc_version::version()?);
    Ok(())
}
