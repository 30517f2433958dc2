//! JSON-RPC 2.0 surface of the incident server
//!
//! Features:
//! - LSP-style Content-Length headers for reliable message framing
//! - stdio and Unix socket transports, one task per socket connection
//! - live feed events pushed as notifications on the subscribing connection

pub mod methods;
pub mod protocol;
pub mod server;
pub mod transport;

pub use methods::*;
pub use protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
pub use server::{
    ConnectionContext, JsonRpcServer, MethodHandler, NotificationReceiver, NotificationSender,
};
pub use transport::{Connection, TransportConfig};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::handlers::{
    FeedHandler, GetIncidentRequest, IngestHandler, ListIncidentsRequest, MetricsHandler,
    MetricsRequest, QueryHandler, SubscribeRequest, SubscribeResponse, SyncRequest,
    TransitionHandler, TransitionRequest, UnsubscribeRequest,
};
use crate::lifecycle::LifecycleManager;
use crate::SiaasError;

/// Register every incident server method on `server`.
///
/// Methods accept their request types directly as params, e.g. `siaas/incident/transition`:
/// ```json
/// {
///   "principal": {"subject": "ana", "role": "ZONE_SUPERVISOR", "zone": "ZONE_1"},
///   "id": "…",
///   "status": "IN_PROGRESS"
/// }
/// ```
pub async fn register_siaas_methods(server: &JsonRpcServer, manager: Arc<LifecycleManager>) {
    let ingest = Arc::new(IngestHandler::new(manager.clone()));
    let query = Arc::new(QueryHandler::new(manager.clone()));
    let transition = Arc::new(TransitionHandler::new(manager.clone()));
    let metrics = Arc::new(MetricsHandler::new(manager.clone()));
    let feed = Arc::new(FeedHandler::new(manager.broadcaster().clone()));

    {
        let ingest = ingest.clone();
        server
            .register_async_method(INCIDENT_SYNC, move |params| {
                let ingest = ingest.clone();
                async move {
                    let request: SyncRequest = parse_params(params)?;
                    to_result(ingest.handle_sync(request).await?)
                }
            })
            .await;
    }

    {
        let query = query.clone();
        server
            .register_async_method(INCIDENT_LIST, move |params| {
                let query = query.clone();
                async move {
                    let request: ListIncidentsRequest = parse_params(params)?;
                    to_result(query.handle_list(request).await?)
                }
            })
            .await;
    }

    server
        .register_async_method(INCIDENT_GET, move |params| {
            let query = query.clone();
            async move {
                let request: GetIncidentRequest = parse_params(params)?;
                to_result(query.handle_get(request).await?)
            }
        })
        .await;

    server
        .register_async_method(INCIDENT_TRANSITION, move |params| {
            let transition = transition.clone();
            async move {
                let request: TransitionRequest = parse_params(params)?;
                to_result(transition.handle_transition(request).await?)
            }
        })
        .await;

    server
        .register_async_method(METRICS_SUMMARY, move |params| {
            let metrics = metrics.clone();
            async move {
                let request: MetricsRequest = parse_params(params)?;
                to_result(metrics.handle_summary(request).await?)
            }
        })
        .await;

    {
        let feed = feed.clone();
        server
            .register_streaming_method(FEED_SUBSCRIBE, move |params, context| {
                let feed = feed.clone();
                async move {
                    let request: SubscribeRequest = parse_params(params)?;
                    let subscription = feed.handle_subscribe(request).await?;
                    let session_id = subscription.session_id.clone();

                    let release = {
                        let feed = feed.clone();
                        let session_id = session_id.clone();
                        Box::pin(async move {
                            let _ = feed
                                .handle_unsubscribe(UnsubscribeRequest { session_id })
                                .await;
                        })
                    };
                    context.claim_session(&session_id, release).await;

                    // Events for the session must not reach the client before its id does
                    context
                        .spawn_after_response(Box::pin(forward_feed(
                            subscription,
                            context.notifier.clone(),
                            feed.clone(),
                        )))
                        .await;
                    to_result(SubscribeResponse { session_id })
                }
            })
            .await;
    }

    server
        .register_streaming_method(FEED_UNSUBSCRIBE, move |params, context| {
            let feed = feed.clone();
            async move {
                let request: UnsubscribeRequest = parse_params(params)?;
                if !context.release_session(&request.session_id).await {
                    return Err(JsonRpcError::from(SiaasError::SessionNotFound(
                        request.session_id,
                    )));
                }
                to_result(feed.handle_unsubscribe(request).await?)
            }
        })
        .await;

    info!("Registered {} SIAAS JSON-RPC methods", ALL_METHODS.len());
}

/// Relay a subscription's events to its connection until either side goes away.
/// Waiting on a full connection queue lets the session's own queue fill, where the
/// broadcaster drops and counts further events.
async fn forward_feed(
    subscription: crate::broadcast::Subscription,
    notifier: NotificationSender,
    feed: Arc<FeedHandler>,
) {
    let crate::broadcast::Subscription {
        session_id,
        mut receiver,
    } = subscription;

    while let Some(event) = receiver.recv().await {
        let notification = match JsonRpcNotification::feed_event(&session_id, &event) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::error!("Failed to encode feed event {}: {}", event.sequence_number, e);
                continue;
            }
        };
        if notifier.send(notification).await.is_err() {
            debug!("Connection for feed session {} is gone", session_id);
            break;
        }
    }
    drop(receiver);
    let _ = feed
        .handle_unsubscribe(UnsubscribeRequest {
            session_id: session_id.clone(),
        })
        .await;
    debug!("Feed forwarder for {} finished", session_id);
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, JsonRpcError> {
    let params_value = params.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(params_value.clone())
        .map_err(|e| create_parse_error::<T>(&e, &params_value))
}

fn to_result<T: Serialize>(response: T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(response).map_err(|e| {
        JsonRpcError::custom(
            protocol::error_codes::INTERNAL_ERROR,
            format!("Failed to serialize response: {}", e),
            None,
        )
    })
}

fn create_parse_error<T>(error: &serde_json::Error, params: &serde_json::Value) -> JsonRpcError {
    let type_name = std::any::type_name::<T>()
        .rsplit("::")
        .next()
        .unwrap_or("Request");

    let received_fields: Vec<&str> = match params {
        serde_json::Value::Object(map) => map.keys().map(|s| s.as_str()).collect(),
        _ => vec![],
    };

    let hint = if received_fields.is_empty() {
        "No parameters provided".to_string()
    } else {
        format!("Received fields: {}", received_fields.join(", "))
    };

    JsonRpcError::custom(
        protocol::error_codes::INVALID_PARAMS,
        format!("Invalid {}: {}. {}", type_name, error, hint),
        Some(serde_json::json!({
            "parse_error": error.to_string(),
            "received": params,
        })),
    )
}
