// Public exports for data models

pub mod events;
pub mod incident;
pub mod principal;

pub use events::{LifecycleEvent, LifecycleEventKind};
pub use incident::{
    HistoryEntry, Incident, IncidentId, IncidentStatus, IncidentView, Location, SeverityLabel,
    HIGH_SCORE_THRESHOLD, MEDIUM_SCORE_THRESHOLD, SYSTEM_ACTOR,
};
pub use principal::{Principal, Role, VisibilityTier};
