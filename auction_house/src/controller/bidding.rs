use std::sync::Arc;

use model::domain::assignment::RemoteAssignment;
use model::view::auction::JobAssignment;
use model::view::Versioned;

use super::ControllerError;
use crate::service::bidding::BiddingClient;

/// A job this node won. Returns whether it was not received before.
pub fn accept_assignment(
    auction_id: &str,
    payload: Versioned<JobAssignment>,
    bidding: &Arc<BiddingClient>,
) -> Result<bool, ControllerError> {
    let assignment = payload.into_checked()?;
    trace!("assignment for {}: {:?}", auction_id, assignment);
    Ok(bidding.accept_assignment(auction_id, assignment)?)
}

pub fn list_assignments(bidding: &BiddingClient) -> Vec<RemoteAssignment> {
    bidding.list_assignments()
}
