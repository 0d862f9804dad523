use model::view::discovery::{DiscoveryHosts, DiscoveryRegistration};
use model::view::Versioned;

use super::ControllerError;
use crate::service::discovery::DiscoveryMaintainer;

pub async fn get_hosts(discovery: &DiscoveryMaintainer) -> DiscoveryHosts {
    discovery.handle_get().await
}

/// Register a peer of the same ring.
pub async fn register(
    payload: Versioned<DiscoveryRegistration>,
    discovery: &DiscoveryMaintainer,
) -> Result<DiscoveryRegistration, ControllerError> {
    let registration = payload.into_checked()?;
    trace!("registration: {:?}", registration);
    Ok(discovery.handle_post(registration).await?)
}
