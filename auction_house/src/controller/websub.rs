use std::sync::Arc;

use model::view::websub::{HubMode, HubRequest, VerificationQuery};

use super::ControllerError;
use crate::service::hub::EmbeddedHub;
use crate::service::notification::NotificationBridge;

/// The challenge to echo, `None` when the verification is refused.
pub fn verify(
    query: &VerificationQuery,
    bridge: &NotificationBridge,
) -> Option<String> {
    trace!("verification of {:?} for {}", query.mode, query.topic);
    bridge.verify_subscription(query)
}

/// Content pushed by a hub. Returns the number of auctions queued.
pub async fn receive(
    body: &[u8],
    bridge: &NotificationBridge,
) -> Result<usize, ControllerError> {
    Ok(bridge.receive_push(body).await?)
}

pub fn hub_request(
    request: HubRequest,
    hub: &Arc<EmbeddedHub>,
) -> Result<HubMode, ControllerError> {
    trace!("hub request: {:?}", request);
    Ok(hub.accept(request)?)
}
