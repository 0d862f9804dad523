use std::sync::Arc;

use model::view::auction::{
    AuctionList, AuctionView, PostAuction, PostBid, PostJobResult,
};
use model::view::Versioned;
use model::{AuctionId, PeerUri};

use super::ControllerError;
use crate::service::auction::AuctionEngine;

fn parse_bidder(raw: String) -> Result<PeerUri, ControllerError> {
    PeerUri::try_new(raw.clone()).map_err(|err| {
        ControllerError::InvalidRequest(format!(
            "bidderUri {:?} is not an absolute URI: {}",
            raw, err
        ))
    })
}

/// Open a new auction, its deadline is armed right away.
pub async fn open_auction(
    payload: Versioned<PostAuction>,
    engine: &Arc<AuctionEngine>,
) -> Result<AuctionView, ControllerError> {
    let request = payload.into_checked()?;
    trace!("opening auction: {:?}", request);
    let auction = engine.open_auction(request).await?;
    Ok(AuctionView::from_auction(&auction, engine.house()))
}

/// Open auctions only, unless `all` is set.
pub async fn list_auctions(all: bool, engine: &AuctionEngine) -> AuctionList {
    trace!("listing auctions, all: {}", all);
    let auctions = engine
        .list_auctions(all)
        .await
        .iter()
        .map(|auction| AuctionView::from_auction(auction, engine.house()))
        .collect();
    AuctionList { auctions }
}

pub async fn get_auction(
    id: &AuctionId,
    engine: &AuctionEngine,
) -> Result<AuctionView, ControllerError> {
    let auction = engine.get_auction(id).await?;
    Ok(AuctionView::from_auction(&auction, engine.house()))
}

pub async fn submit_bid(
    id: &AuctionId,
    payload: Versioned<PostBid>,
    engine: &AuctionEngine,
) -> Result<(), ControllerError> {
    let bid = payload.into_checked()?;
    trace!("bid on {}: {:?}", id, bid);
    if let Some(repeated) = &bid.auction_id {
        if repeated.trim() != id.to_string() {
            return Err(ControllerError::InvalidRequest(format!(
                "the body names the auction {}, the path {}",
                repeated, id
            )));
        }
    }
    let bidder = parse_bidder(bid.bidder_uri)?;
    engine.submit_bid(id, bidder, bid.bidder_name, bid.bid_value).await?;
    Ok(())
}

/// Result reported by the winner, the auction is returned completed.
pub async fn report_result(
    id: &AuctionId,
    payload: Versioned<PostJobResult>,
    engine: &AuctionEngine,
) -> Result<AuctionView, ControllerError> {
    let result = payload.into_checked()?;
    trace!("result for {} from {}", id, result.bidder_uri);
    let bidder = parse_bidder(result.bidder_uri)?;
    engine.report_result(id, &bidder, result.output_data).await?;
    get_auction(id, engine).await
}
