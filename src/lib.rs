//! SIAAS Incident Server
//!
//! Ingests field-reported safety incidents from intermittently connected mobile
//! clients, classifies their severity, tracks them through a bounded lifecycle
//! and pushes zone-filtered live updates to supervisory dashboards over JSON-RPC.

pub mod authz;
pub mod broadcast;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod jsonrpc;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod server;

use models::IncidentStatus;

/// Application-wide error types with context preservation
#[derive(Debug, thiserror::Error)]
pub enum SiaasError {
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    #[error("Incident not found: {0}")]
    NotFound(String),

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: IncidentStatus, to: IncidentStatus },

    #[error("Not authorized: {message}")]
    NotAuthorized { message: String },

    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Feed session not found: {0}")]
    SessionNotFound(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl SiaasError {
    /// Create a validation error with the offending field, if known
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(String::from),
        }
    }

    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn illegal_transition(from: IncidentStatus, to: IncidentStatus) -> Self {
        Self::IllegalTransition { from, to }
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized {
            message: message.into(),
        }
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Get error code for JSON-RPC responses
    pub fn error_code(&self) -> i32 {
        match self {
            SiaasError::Validation { .. } => -32020,
            SiaasError::NotFound(_) => -32021,
            SiaasError::IllegalTransition { .. } => -32022,
            SiaasError::NotAuthorized { .. } => -32023,
            SiaasError::StorageUnavailable { .. } => -32024,
            SiaasError::SessionNotFound(_) => -32025,
            SiaasError::ResourceExhausted(_) => -32015,
            SiaasError::Configuration { .. } => -32014,
            SiaasError::Transport { .. } => -32001,
            SiaasError::Internal(_) => -32603,
            SiaasError::Io { .. } => -32603,
            SiaasError::Serialization { .. } => -32700,
        }
    }

    /// Stable machine-readable kind, carried in JSON-RPC error data
    pub fn kind(&self) -> &'static str {
        match self {
            SiaasError::Validation { .. } => "validation_error",
            SiaasError::NotFound(_) => "not_found",
            SiaasError::IllegalTransition { .. } => "illegal_transition",
            SiaasError::NotAuthorized { .. } => "not_authorized",
            SiaasError::StorageUnavailable { .. } => "storage_unavailable",
            SiaasError::SessionNotFound(_) => "session_not_found",
            SiaasError::ResourceExhausted(_) => "resource_exhausted",
            SiaasError::Configuration { .. } => "configuration",
            SiaasError::Transport { .. } => "transport",
            SiaasError::Internal(_) => "internal",
            SiaasError::Io { .. } => "io",
            SiaasError::Serialization { .. } => "serialization",
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            SiaasError::Validation { message, field } => {
                if let Some(f) = field {
                    format!("Invalid report ({}): {}", f, message)
                } else {
                    format!("Invalid report: {}", message)
                }
            }
            SiaasError::NotFound(id) => format!("Incident not found: {}", id),
            SiaasError::IllegalTransition { from, to } => {
                format!("Cannot move incident from {} to {}", from, to)
            }
            SiaasError::NotAuthorized { message } => format!("Access denied: {}", message),
            SiaasError::StorageUnavailable { message } => {
                format!("Incident store unavailable: {}", message)
            }
            SiaasError::Configuration { message } => format!("Configuration issue: {}", message),
            SiaasError::Transport { message } => format!("Communication error: {}", message),
            SiaasError::SessionNotFound(id) => format!("Live feed session not found: {}", id),
            SiaasError::ResourceExhausted(what) => format!("Server busy: {}", what),
            SiaasError::Internal(message) => format!("Internal error: {}", message),
            SiaasError::Io { source } => format!("File system error: {}", source),
            SiaasError::Serialization { source } => format!("Data format error: {}", source),
        }
    }
}

/// Convenience type alias for Results
pub type SiaasResult<T> = Result<T, SiaasError>;
