use anyhow::Result;
use tokio::time::{timeout, Duration};

use siaas::broadcast::BroadcastConfig;
use siaas::config::init_test_logging;
use siaas::lifecycle::LifecycleConfig;
use siaas::models::{IncidentStatus, LifecycleEventKind};
use siaas::SiaasError;

mod common;
use common::{admin, report, reporter, stack, stack_with, supervisor, RECV_TIMEOUT};

#[tokio::test]
async fn test_supervisor_feed_is_zone_filtered() -> Result<()> {
    let _ = init_test_logging();
    let stack = stack();

    let mut zone_one = stack.broadcaster.register_session(&supervisor("ZONE_1")).await?;
    let mut global = stack.broadcaster.register_session(&admin()).await?;

    let hidden = stack.manager.create(&report("Caída", "ZONE_2"), None).await?.incident;
    let shown = stack.manager.create(&report("Caída", "ZONE_1"), None).await?.incident;

    let event = timeout(RECV_TIMEOUT, zone_one.receiver.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("feed closed"))?;
    assert_eq!(event.incident().id, shown.id);
    assert_eq!(event.kind, LifecycleEventKind::Created);
    assert!(zone_one.receiver.try_recv().is_err());

    let first = global.receiver.recv().await;
    let second = global.receiver.recv().await;
    let ids: Vec<_> = [first, second]
        .into_iter()
        .flatten()
        .map(|event| event.incident().id)
        .collect();
    assert_eq!(ids, vec![hidden.id, shown.id]);
    Ok(())
}

#[tokio::test]
async fn test_transition_events_carry_from_and_to() -> Result<()> {
    let _ = init_test_logging();
    let stack = stack();
    let ana = supervisor("ZONE_1");

    let incident = stack.manager.create(&report("Fuga", "ZONE_1"), None).await?.incident;
    let mut feed = stack.broadcaster.register_session(&ana).await?;

    stack
        .manager
        .transition(&ana, incident.id, IncidentStatus::InProgress)
        .await?;
    stack
        .manager
        .transition(&ana, incident.id, IncidentStatus::Closed)
        .await?;

    let mut sequence_numbers = Vec::new();
    for expected in [
        (IncidentStatus::Open, IncidentStatus::InProgress),
        (IncidentStatus::InProgress, IncidentStatus::Closed),
    ] {
        let event = timeout(RECV_TIMEOUT, feed.receiver.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("feed closed"))?;
        assert_eq!(
            event.kind,
            LifecycleEventKind::Transitioned {
                from: expected.0,
                to: expected.1
            }
        );
        assert_eq!(event.actor, ana.subject);
        assert_eq!(event.incident.incident.status, expected.1);
        sequence_numbers.push(event.sequence_number);
    }
    assert!(sequence_numbers[0] < sequence_numbers[1]);
    Ok(())
}

#[tokio::test]
async fn test_failed_operations_emit_nothing() -> Result<()> {
    let _ = init_test_logging();
    let stack = stack();
    let mut feed = stack.broadcaster.register_session(&admin()).await?;

    let incident = stack.manager.create(&report("Caída", "ZONE_1"), None).await?.incident;
    feed.receiver.recv().await;

    let illegal = stack
        .manager
        .transition(&admin(), incident.id, IncidentStatus::Closed)
        .await;
    assert!(matches!(illegal, Err(SiaasError::IllegalTransition { .. })));

    let invalid = stack.manager.create(&serde_json::json!({"zona": "ZONE_1"}), None).await;
    assert!(matches!(invalid, Err(SiaasError::Validation { .. })));

    assert!(timeout(Duration::from_millis(50), feed.receiver.recv()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_slow_subscriber_loses_events_without_blocking_writes() -> Result<()> {
    let _ = init_test_logging();
    let stack = stack_with(
        LifecycleConfig::default(),
        BroadcastConfig {
            session_buffer_size: 1,
            ..BroadcastConfig::default()
        },
    );
    let mut slow = stack.broadcaster.register_session(&admin()).await?;

    for n in 0..5 {
        timeout(
            RECV_TIMEOUT,
            stack.manager.create(&report(&format!("Caída {}", n), "ZONE_1"), None),
        )
        .await??;
    }
    assert_eq!(stack.repository.len().await, 5);

    let stats = stack.broadcaster.stats().await;
    assert_eq!(stats.total_delivered, 1);
    assert_eq!(stats.total_dropped, 4);

    let first = slow.receiver.recv().await;
    assert!(first.is_some());
    assert!(slow.receiver.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_dropped_subscriber_is_pruned() -> Result<()> {
    let _ = init_test_logging();
    let stack = stack();

    let gone = stack.broadcaster.register_session(&admin()).await?;
    let mut kept = stack.broadcaster.register_session(&supervisor("ZONE_1")).await?;
    drop(gone.receiver);
    assert_eq!(stack.broadcaster.session_count().await, 2);

    stack.manager.create(&report("Caída", "ZONE_1"), None).await?;

    assert_eq!(stack.broadcaster.session_count().await, 1);
    assert!(kept.receiver.recv().await.is_some());
    assert!(!stack.broadcaster.unregister(&gone.session_id).await);
    assert!(stack.broadcaster.unregister(&kept.session_id).await);
    Ok(())
}

#[tokio::test]
async fn test_session_registration_limits() -> Result<()> {
    let _ = init_test_logging();
    let stack = stack_with(
        LifecycleConfig::default(),
        BroadcastConfig {
            max_sessions: 1,
            ..BroadcastConfig::default()
        },
    );

    let denied = stack.broadcaster.register_session(&reporter("ZONE_1")).await;
    assert!(matches!(denied, Err(SiaasError::NotAuthorized { .. })));

    let first = stack.broadcaster.register_session(&admin()).await?;
    let over_cap = stack.broadcaster.register_session(&admin()).await;
    assert!(matches!(over_cap, Err(SiaasError::ResourceExhausted(_))));

    stack.broadcaster.unregister(&first.session_id).await;
    assert!(stack.broadcaster.register_session(&admin()).await.is_ok());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequence_numbers_follow_commit_order() -> Result<()> {
    let _ = init_test_logging();
    let stack = stack();
    let mut feed = stack.broadcaster.register_session(&admin()).await?;

    let tasks: Vec<_> = (0..40)
        .map(|n| {
            let manager = stack.manager.clone();
            tokio::spawn(async move {
                let incident = manager
                    .create(&report(&format!("Corte {}", n), "ZONE_1"), None)
                    .await?
                    .incident;
                manager
                    .transition(&admin(), incident.id, IncidentStatus::InProgress)
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await??;
    }

    let mut events = Vec::new();
    while let Ok(event) = feed.receiver.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 80);

    // Every event's commit timestamp is taken under the write guard
    events.sort_by_key(|event| event.sequence_number);
    let committed_at: Vec<_> = events
        .iter()
        .map(|event| match event.kind {
            LifecycleEventKind::Created => Some(event.incident().received_at),
            LifecycleEventKind::Transitioned { .. } => {
                event.incident().history.last().map(|entry| entry.timestamp)
            }
        })
        .collect();
    assert!(committed_at.windows(2).all(|pair| pair[0] <= pair[1]));
    Ok(())
}
