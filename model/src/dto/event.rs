use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::auction::{Auction, AuctionStatus};
use crate::view::{Envelope, UnsupportedVersion};
use crate::{PeerUri, API_VERSION};

/// What is announced about an auction on every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionPayload {
    pub auction_id:        String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_uri:       Option<String>,
    pub auction_house_uri: PeerUri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_uri:           Option<String>,
    #[serde(default)]
    pub job_type:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline:          Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status:            Option<AuctionStatus>,
}

impl AuctionPayload {
    pub fn from_auction(auction: &Auction, house: &PeerUri) -> Self {
        Self {
            auction_id:        auction.id.to_string(),
            auction_uri:       Some(
                house.join(&format!("auctions/{}", auction.id)),
            ),
            auction_house_uri: house.clone(),
            job_uri:           Some(auction.job_uri.clone()),
            job_type:          auction.job_type.clone(),
            deadline:          Some(auction.deadline),
            status:            Some(auction.status()),
        }
    }

    /// The URI identifying the auction, derived from the house when the
    /// sender did not give one.
    pub fn auction_uri(&self) -> String {
        match &self.auction_uri {
            Some(uri) if !uri.trim().is_empty() => {
                uri.trim().trim_end_matches('/').to_string()
            }
            _ => self
                .auction_house_uri
                .join(&format!("auctions/{}", self.auction_id.trim())),
        }
    }

    /// Missing status or deadline count as open.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let open = self
            .status
            .map(|status| status == AuctionStatus::Open)
            .unwrap_or(true);
        let before_deadline =
            self.deadline.map(|deadline| now < deadline).unwrap_or(true);
        open && before_deadline
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionEvent {
    pub auction: AuctionPayload,
}

/// `{version, data:{auction}}`, as sent on the broker. `version` may be
/// omitted by lenient publishers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub data:    AuctionEvent,
}

impl AuctionMessage {
    pub fn new(auction: AuctionPayload) -> Self {
        Self {
            version: Some(API_VERSION),
            data:    AuctionEvent { auction },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionPayloadList {
    #[serde(default)]
    pub auctions: Vec<AuctionPayload>,
}

/// Every shape of auction content accepted from a hub push or a peer
/// listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuctionContent {
    Single(AuctionMessage),
    List(Envelope<AuctionPayloadList>),
    BareList(AuctionPayloadList),
    Array(Vec<AuctionPayload>),
}

impl AuctionContent {
    pub fn into_payloads(
        self,
    ) -> Result<Vec<AuctionPayload>, UnsupportedVersion> {
        match self {
            AuctionContent::Single(message) => {
                check_version(message.version)?;
                Ok(vec![message.data.auction])
            }
            AuctionContent::List(envelope) => {
                check_version(Some(envelope.version))?;
                Ok(envelope.data.auctions)
            }
            AuctionContent::BareList(list) => Ok(list.auctions),
            AuctionContent::Array(auctions) => Ok(auctions),
        }
    }
}

fn check_version(version: Option<u32>) -> Result<(), UnsupportedVersion> {
    match version {
        Some(version) if version != API_VERSION => {
            Err(UnsupportedVersion { found: version.to_string() })
        }
        _ => Ok(()),
    }
}

/// Where an inbound event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTransport {
    Hub,
    Broker,
    Poll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub payload:   AuctionPayload,
    pub transport: InboundTransport,
}
