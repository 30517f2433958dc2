//! CLI utility functions.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::ServerSettings;

/// Load a report payload from a file or inline JSON
pub fn load_payload(
    payload_file: Option<PathBuf>,
    payload_json: Option<String>,
) -> Result<serde_json::Value> {
    match (payload_file, payload_json) {
        (Some(path), None) => {
            if !path.exists() {
                anyhow::bail!("Payload file not found: {}", path.display());
            }
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse JSON from {}: {}", path.display(), e))
        }
        (None, Some(json_str)) => serde_json::from_str(&json_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse inline JSON: {}", e)),
        (None, None) => {
            anyhow::bail!("No payload provided. Use --payload-file or --payload-json.");
        }
        (Some(_), Some(_)) => {
            anyhow::bail!("Cannot use both --payload-file and --payload-json");
        }
    }
}

/// Settings from file and environment, before CLI flags
pub fn load_settings(config_path: Option<&Path>) -> Result<ServerSettings> {
    ServerSettings::load(config_path)
}

/// Apply `serve` flags on top of loaded settings
pub fn apply_serve_flags(
    settings: &mut ServerSettings,
    transport: Option<String>,
    socket_path: Option<String>,
    log_level: Option<String>,
) {
    if let Some(transport) = transport {
        settings.server.transport = transport;
    }
    if let Some(socket_path) = socket_path {
        settings.server.socket_path = Some(socket_path);
    }
    if let Some(log_level) = log_level {
        settings.server.log_level = log_level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_payload_sources() {
        let inline = load_payload(None, Some(r#"{"tipo":"Caída"}"#.to_string())).unwrap();
        assert_eq!(inline["tipo"], "Caída");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"type":"Fire","severity":"high"}}"#).unwrap();
        let from_file = load_payload(Some(file.path().to_path_buf()), None).unwrap();
        assert_eq!(from_file["severity"], "high");

        assert!(load_payload(None, None).is_err());
        assert!(load_payload(None, Some("not json".to_string())).is_err());
        assert!(load_payload(Some(PathBuf::from("/nonexistent/report.json")), None).is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let mut settings = ServerSettings::default();
        apply_serve_flags(
            &mut settings,
            Some("socket".to_string()),
            Some("/tmp/flag.sock".to_string()),
            None,
        );
        assert_eq!(settings.server.transport, "socket");
        assert_eq!(settings.server.socket_path.as_deref(), Some("/tmp/flag.sock"));
        assert_eq!(settings.server.log_level, "info");
    }
}
