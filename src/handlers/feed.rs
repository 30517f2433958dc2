use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::broadcast::{Broadcaster, Subscription};
use crate::handlers::validate_request;
use crate::models::Principal;
use crate::SiaasResult;

/// Request type for siaas/feed/subscribe
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(nested)]
    pub principal: Principal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub session_id: String,
}

/// Request type for siaas/feed/unsubscribe
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UnsubscribeRequest {
    #[validate(length(min = 1, message = "Session ID cannot be empty"))]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub removed: bool,
}

/// Live feed registration. Delivery of the subscription's events is left to the
/// transport, which owns the connection they are pushed over.
pub struct FeedHandler {
    broadcaster: Arc<Broadcaster>,
}

impl FeedHandler {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }

    pub async fn handle_subscribe(&self, request: SubscribeRequest) -> SiaasResult<Subscription> {
        validate_request(&request)?;
        self.broadcaster.register_session(&request.principal).await
    }

    pub async fn handle_unsubscribe(&self, request: UnsubscribeRequest) -> SiaasResult<UnsubscribeResponse> {
        validate_request(&request)?;
        let removed = self.broadcaster.unregister(&request.session_id).await;
        if removed {
            info!("Feed session {} unsubscribed by client", request.session_id);
        }
        Ok(UnsubscribeResponse { removed })
    }
}
