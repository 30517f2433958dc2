//! JSON-RPC method name constants

pub const INCIDENT_SYNC: &str = "siaas/incident/sync";
pub const INCIDENT_LIST: &str = "siaas/incident/list";
pub const INCIDENT_GET: &str = "siaas/incident/get";
pub const INCIDENT_TRANSITION: &str = "siaas/incident/transition";
pub const METRICS_SUMMARY: &str = "siaas/metrics/summary";
pub const FEED_SUBSCRIBE: &str = "siaas/feed/subscribe";
pub const FEED_UNSUBSCRIBE: &str = "siaas/feed/unsubscribe";

/// Server-to-client notification carrying one lifecycle event
pub const FEED_EVENT: &str = "siaas/feed/event";

/// All request methods served
pub const ALL_METHODS: &[&str] = &[
    INCIDENT_SYNC,
    INCIDENT_LIST,
    INCIDENT_GET,
    INCIDENT_TRANSITION,
    METRICS_SUMMARY,
    FEED_SUBSCRIBE,
    FEED_UNSUBSCRIBE,
];
