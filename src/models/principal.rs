use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Roles carried by the authenticated principal.
///
/// The credential service issues a wider vocabulary of role names; every one of them
/// collapses onto one of these three variants when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum Role {
    FieldReporter,
    ZoneSupervisor,
    GlobalAdmin,
}

/// What a role may see on the dashboard side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityTier {
    NoAccess,
    ZoneScoped,
    Global,
}

impl Role {
    /// Single mapping from role to visibility tier
    pub fn tier(self) -> VisibilityTier {
        match self {
            Role::FieldReporter => VisibilityTier::NoAccess,
            Role::ZoneSupervisor => VisibilityTier::ZoneScoped,
            Role::GlobalAdmin => VisibilityTier::Global,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::FieldReporter => "FIELD_REPORTER",
            Role::ZoneSupervisor => "ZONE_SUPERVISOR",
            Role::GlobalAdmin => "GLOBAL_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ADMIN" | "GLOBAL_ADMIN" => Ok(Role::GlobalAdmin),
            "SUPERVISOR" | "ZONE_SUPERVISOR" | "TOPICO" => Ok(Role::ZoneSupervisor),
            "REPORTER" | "FIELD_REPORTER" | "BRIGADISTA" | "OPERARIO" => Ok(Role::FieldReporter),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Authenticated actor as asserted by the credential service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Principal {
    #[validate(length(min = 1, message = "Principal subject cannot be empty"))]
    pub subject: String,
    pub role: Role,
    #[serde(default)]
    pub zone: Option<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, role: Role, zone: Option<&str>) -> Self {
        Self {
            subject: subject.into(),
            role,
            zone: zone.map(String::from),
        }
    }

    /// Assigned zone, with blank values treated as unassigned
    pub fn assigned_zone(&self) -> Option<&str> {
        self.zone
            .as_deref()
            .map(str::trim)
            .filter(|zone| !zone.is_empty())
    }

    pub fn tier(&self) -> VisibilityTier {
        self.role.tier()
    }
}
