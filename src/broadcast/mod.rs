//! Live feed broadcaster.
//!
//! Keeps the registry of connected dashboard sessions and fans lifecycle events out to
//! those whose visibility covers the event's incident. Delivery is best-effort: each
//! session owns a bounded queue, a full queue drops the event for that session only and
//! a closed queue is pruned after the fan-out pass. Nothing here ever fails the write
//! that produced the event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authz::{self, AccessScope, UnzonedSupervisorPolicy};
use crate::models::{LifecycleEvent, Principal};
use crate::{SiaasError, SiaasResult};

pub type SessionId = String;

/// Configuration for live feed behavior
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Per-session queue capacity
    pub session_buffer_size: usize,
    /// Maximum number of concurrently registered sessions
    pub max_sessions: usize,
    pub unzoned_supervisor: UnzonedSupervisorPolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            session_buffer_size: 256,
            max_sessions: 64,
            unzoned_supervisor: UnzonedSupervisorPolicy::default(),
        }
    }
}

/// Handle returned to the subscriber; dropping the receiver ends delivery
#[derive(Debug)]
pub struct Subscription {
    pub session_id: SessionId,
    pub receiver: mpsc::Receiver<LifecycleEvent>,
}

struct FeedSession {
    subject: String,
    scope: AccessScope,
    sender: mpsc::Sender<LifecycleEvent>,
    created_at: chrono::DateTime<chrono::Utc>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub filtered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastStats {
    pub active_sessions: usize,
    pub total_delivered: u64,
    pub total_dropped: u64,
    pub oldest_session_age_seconds: Option<i64>,
}

pub struct Broadcaster {
    config: BroadcastConfig,
    sessions: RwLock<HashMap<SessionId, FeedSession>>,
    sequence_number: AtomicU64,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            sequence_number: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Next event sequence number, monotonically increasing per process
    pub fn next_sequence(&self) -> u64 {
        self.sequence_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a live feed session for `principal`
    pub async fn register_session(&self, principal: &Principal) -> SiaasResult<Subscription> {
        authz::require_dashboard_access(principal)?;
        // An empty scope still registers, the same as an empty list
        let scope = AccessScope::for_principal(principal, self.config.unzoned_supervisor);

        let (sender, receiver) = mpsc::channel(self.config.session_buffer_size.max(1));
        let session_id = Uuid::new_v4().to_string();

        {
            let mut sessions = self.sessions.write().await;
            if sessions.len() >= self.config.max_sessions {
                return Err(SiaasError::ResourceExhausted(format!(
                    "live feed session limit reached ({})",
                    self.config.max_sessions
                )));
            }
            sessions.insert(
                session_id.clone(),
                FeedSession {
                    subject: principal.subject.clone(),
                    scope,
                    sender,
                    created_at: chrono::Utc::now(),
                    delivered: AtomicU64::new(0),
                    dropped: AtomicU64::new(0),
                },
            );
        }

        info!(
            "Registered feed session {} for {} ({})",
            session_id, principal.subject, principal.role
        );
        Ok(Subscription {
            session_id,
            receiver,
        })
    }

    /// Remove a session. Unknown or already removed ids are a no-op returning `false`.
    pub async fn unregister(&self, session_id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(session_id)
        };

        match removed {
            Some(session) => {
                info!(
                    "Closed feed session {} for {} ({} delivered)",
                    session_id,
                    session.subject,
                    session.delivered.load(Ordering::Relaxed)
                );
                true
            }
            None => {
                debug!("Feed session {} already gone", session_id);
                false
            }
        }
    }

    /// Push `event` to every session whose scope covers its incident
    pub async fn on_lifecycle_event(&self, event: &LifecycleEvent) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut closed = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (session_id, session) in sessions.iter() {
                if !session.scope.permits(event.incident()) {
                    report.filtered += 1;
                    continue;
                }

                match session.sender.try_send(event.clone()) {
                    Ok(()) => {
                        session.delivered.fetch_add(1, Ordering::Relaxed);
                        report.delivered += 1;
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        session.dropped.fetch_add(1, Ordering::Relaxed);
                        report.dropped += 1;
                        warn!(
                            "Feed session {} is not keeping up; dropped event {}",
                            session_id, event.sequence_number
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(session_id.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for session_id in &closed {
                if sessions
                    .get(session_id)
                    .map(|s| s.sender.is_closed())
                    .unwrap_or(false)
                {
                    sessions.remove(session_id);
                    report.pruned += 1;
                }
            }
            debug!("Pruned {} disconnected feed sessions", report.pruned);
        }

        debug!(
            "Event {} fan-out: {} delivered, {} filtered, {} dropped",
            event.sequence_number, report.delivered, report.filtered, report.dropped
        );
        report
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn stats(&self) -> BroadcastStats {
        let sessions = self.sessions.read().await;
        let now = chrono::Utc::now();
        BroadcastStats {
            active_sessions: sessions.len(),
            total_delivered: sessions
                .values()
                .map(|s| s.delivered.load(Ordering::Relaxed))
                .sum(),
            total_dropped: sessions
                .values()
                .map(|s| s.dropped.load(Ordering::Relaxed))
                .sum(),
            oldest_session_age_seconds: sessions
                .values()
                .map(|s| (now - s.created_at).num_seconds())
                .max(),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Incident, Role};
    use chrono::Utc;
    use tokio::time::{timeout, Duration};

    fn created(broadcaster: &Broadcaster, zone: &str) -> LifecycleEvent {
        let incident = Incident::open("corte".into(), zone.into(), 60, Utc::now());
        LifecycleEvent::created(broadcaster.next_sequence(), incident)
    }

    #[tokio::test]
    async fn test_events_reach_only_visible_sessions() {
        let broadcaster = Broadcaster::default();
        let mut zone1 = broadcaster
            .register_session(&Principal::new("ana", Role::ZoneSupervisor, Some("ZONE_1")))
            .await
            .unwrap();
        let mut admin = broadcaster
            .register_session(&Principal::new("root", Role::GlobalAdmin, None))
            .await
            .unwrap();

        let event = created(&broadcaster, "ZONE_2");
        let report = broadcaster.on_lifecycle_event(&event).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.filtered, 1);

        let got = timeout(Duration::from_millis(100), admin.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.incident().zone, "ZONE_2");
        assert!(zone1.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_field_reporter_cannot_subscribe() {
        let broadcaster = Broadcaster::default();
        let result = broadcaster
            .register_session(&Principal::new("pepe", Role::FieldReporter, Some("ZONE_1")))
            .await;
        assert!(matches!(result, Err(SiaasError::NotAuthorized { .. })));
    }

    #[tokio::test]
    async fn test_fail_closed_unzoned_supervisor_subscribes_to_nothing() {
        let broadcaster = Broadcaster::new(BroadcastConfig {
            unzoned_supervisor: UnzonedSupervisorPolicy::FailClosed,
            ..BroadcastConfig::default()
        });
        let mut unassigned = broadcaster
            .register_session(&Principal::new("sup", Role::ZoneSupervisor, None))
            .await
            .unwrap();

        let report = broadcaster
            .on_lifecycle_event(&created(&broadcaster, "ZONE_1"))
            .await;
        assert_eq!(report.filtered, 1);
        assert!(unassigned.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let broadcaster = Broadcaster::default();
        let sub = broadcaster
            .register_session(&Principal::new("root", Role::GlobalAdmin, None))
            .await
            .unwrap();

        assert!(broadcaster.unregister(&sub.session_id).await);
        assert!(!broadcaster.unregister(&sub.session_id).await);
        assert_eq!(broadcaster.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned_without_affecting_others() {
        let broadcaster = Broadcaster::default();
        let gone = broadcaster
            .register_session(&Principal::new("a", Role::GlobalAdmin, None))
            .await
            .unwrap();
        let mut alive = broadcaster
            .register_session(&Principal::new("b", Role::GlobalAdmin, None))
            .await
            .unwrap();
        drop(gone.receiver);

        let report = broadcaster
            .on_lifecycle_event(&created(&broadcaster, "ZONE_1"))
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, 1);
        assert!(alive.receiver.try_recv().is_ok());
        assert_eq!(broadcaster.session_count().await, 1);

        // Unregistering the pruned session is still a quiet no-op
        assert!(!broadcaster.unregister(&gone.session_id).await);
    }

    #[tokio::test]
    async fn test_full_queue_drops_for_that_session_only() {
        let broadcaster = Broadcaster::new(BroadcastConfig {
            session_buffer_size: 1,
            ..BroadcastConfig::default()
        });
        let _slow = broadcaster
            .register_session(&Principal::new("slow", Role::GlobalAdmin, None))
            .await
            .unwrap();

        let first = broadcaster
            .on_lifecycle_event(&created(&broadcaster, "Z"))
            .await;
        let second = broadcaster
            .on_lifecycle_event(&created(&broadcaster, "Z"))
            .await;

        assert_eq!(first.delivered, 1);
        assert_eq!(second.dropped, 1);
        let stats = broadcaster.stats().await;
        assert_eq!(stats.total_delivered, 1);
        assert_eq!(stats.total_dropped, 1);
    }

    #[tokio::test]
    async fn test_session_limit() {
        let broadcaster = Broadcaster::new(BroadcastConfig {
            max_sessions: 1,
            ..BroadcastConfig::default()
        });
        let admin = Principal::new("root", Role::GlobalAdmin, None);
        let _first = broadcaster.register_session(&admin).await.unwrap();
        let second = broadcaster.register_session(&admin).await;
        assert!(matches!(second, Err(SiaasError::ResourceExhausted(_))));
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let broadcaster = Broadcaster::default();
        let a = broadcaster.next_sequence();
        let b = broadcaster.next_sequence();
        assert!(b > a);
    }
}
