use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::assignment::RemoteAssignment;
use crate::domain::auction::{Auction, AuctionStatus, Bid};
use crate::{AuctionId, PeerUri};

/// Body of `POST /auctions/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuction {
    #[serde(default)]
    pub job_uri:  String,
    #[serde(default)]
    pub job_type: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidView {
    pub bidder_uri:  PeerUri,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidder_name: Option<String>,
    pub bid_value:   f64,
    pub received_at: DateTime<Utc>,
}

impl From<&Bid> for BidView {
    fn from(bid: &Bid) -> Self {
        Self {
            bidder_uri:  bid.bidder_uri.clone(),
            bidder_name: bid.bidder_name.clone(),
            bid_value:   bid.value,
            received_at: bid.received_at,
        }
    }
}

/// Public representation of an auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionView {
    pub auction_id:        AuctionId,
    pub auction_uri:       String,
    pub auction_house_uri: PeerUri,
    pub job_uri:           String,
    pub job_type:          String,
    pub deadline:          DateTime<Utc>,
    pub status:            AuctionStatus,
    pub created_at:        DateTime<Utc>,
    pub bid_count:         usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner:            Option<BidView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data:       Option<serde_json::Value>,
}

impl AuctionView {
    pub fn from_auction(auction: &Auction, house: &PeerUri) -> Self {
        Self {
            auction_id:        auction.id.clone(),
            auction_uri:       house.join(&format!("auctions/{}", auction.id)),
            auction_house_uri: house.clone(),
            job_uri:           auction.job_uri.clone(),
            job_type:          auction.job_type.clone(),
            deadline:          auction.deadline,
            status:            auction.status(),
            created_at:        auction.created_at,
            bid_count:         auction.bids().len(),
            winner:            auction.winner().map(BidView::from),
            output_data:       auction.result().cloned(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionList {
    pub auctions: Vec<AuctionView>,
}

fn default_bid_value() -> f64 { 1.0 }

/// Body of `POST /auctions/{id}/bid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostBid {
    #[serde(alias = "bidderAuctionHouseUri")]
    pub bidder_uri:  String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidder_name: Option<String>,
    #[serde(default = "default_bid_value")]
    pub bid_value:   f64,
    /// Some bidders repeat the id of the auction in the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id:  Option<String>,
}

/// Body of `POST /auctions/{id}/job`, sent by the winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostJobResult {
    #[serde(alias = "bidderAuctionHouseUri")]
    pub bidder_uri:  String,
    #[serde(default)]
    pub output_data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status:      Option<JobStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Open,
    Executed,
    Failed,
}

/// Sent to the winner at `POST {winner}bidders/{auctionId}/job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAssignment {
    pub auction_id:        String,
    pub auction_house_uri: PeerUri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_uri:           Option<String>,
    pub job_type:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data:        Option<serde_json::Value>,
}

/// What the job store holds about a job, only the fields read here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status:     Option<JobStatus>,
}

/// Body of the `PATCH {jobUri}` sent to the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    pub status:      JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
}

/// Body of `GET /bidders/jobs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentList {
    pub assignments: Vec<RemoteAssignment>,
}
