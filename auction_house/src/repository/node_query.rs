use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use helper::link_header::{self, Link};
use helper::reqwest_helper::API_VERSION_HEADER;
use model::dto::event::{AuctionContent, AuctionPayload};
use model::view::auction::{JobAssignment, PostBid, PostJobResult};
use model::view::discovery::{DiscoveryHosts, DiscoveryRegistration};
use model::view::{Envelope, UnsupportedVersion, Versioned};
use model::{AuctionId, PeerUri, API_VERSION};
use reqwest::header::LINK;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::HttpClient;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),
    #[error("{url} answered with error code {status}")]
    RequestStatus { url: String, status: reqwest::StatusCode },
    #[error("Failed to read the answer of {url}: {source}")]
    Body { url: String, source: serde_json::Error },
    #[error(transparent)]
    Version(#[from] UnsupportedVersion),
}

/// What a peer answers on `GET /auctions/`.
#[derive(Debug, Clone, Default)]
pub struct AuctionListing {
    pub links:    Vec<Link>,
    pub auctions: Vec<AuctionPayload>,
}

/// Calls made to other auction houses.
#[async_trait]
pub trait NodeQuery: Debug + Sync + Send {
    async fn get_discovery(&self, peer: &PeerUri)
        -> Result<DiscoveryHosts, Error>;
    async fn post_discovery(
        &self,
        peer: &PeerUri,
        registration: &DiscoveryRegistration,
    ) -> Result<(), Error>;
    /// Links and open auctions of a peer. An unreadable body gives an empty
    /// list, the links are what the subscription handshake needs.
    async fn get_auctions(&self, peer: &PeerUri)
        -> Result<AuctionListing, Error>;
    /// `auction_uri` is the URI of the auction, without trailing slash.
    async fn post_bid(&self, auction_uri: &str, bid: &PostBid)
        -> Result<(), Error>;
    async fn post_job_assignment(
        &self,
        winner: &PeerUri,
        auction_id: &AuctionId,
        assignment: &JobAssignment,
    ) -> Result<(), Error>;
    async fn post_job_result(
        &self,
        house: &PeerUri,
        auction_id: &str,
        result: &PostJobResult,
    ) -> Result<(), Error>;
    async fn health(&self, peer: &PeerUri) -> Result<(), Error>;
}

#[derive(Debug)]
pub struct NodeQueryRESTImpl {
    client: Arc<HttpClient>,
}

impl NodeQueryRESTImpl {
    pub fn new(client: Arc<HttpClient>) -> Self { Self { client } }

    async fn post<T: Serialize + Sync>(
        &self,
        url: &str,
        data: &T,
    ) -> Result<Response, Error> {
        let response = self
            .client
            .post(url)
            .header(API_VERSION_HEADER, API_VERSION.to_string())
            .json(&Envelope::new(data))
            .send()
            .await?;
        check_status(url, response)
    }

    async fn get(&self, url: &str) -> Result<Response, Error> {
        let response = self
            .client
            .get(url)
            .header(API_VERSION_HEADER, API_VERSION.to_string())
            .send()
            .await?;
        check_status(url, response)
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, Error> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(Error::RequestStatus {
            url:    url.to_string(),
            status: response.status(),
        })
    }
}

async fn read_versioned<T: DeserializeOwned>(
    url: &str,
    response: Response,
) -> Result<T, Error> {
    let body = response.bytes().await?;
    let body: Versioned<T> = serde_json::from_slice(&body)
        .map_err(|source| Error::Body { url: url.to_string(), source })?;
    Ok(body.into_checked()?)
}

#[async_trait]
impl NodeQuery for NodeQueryRESTImpl {
    #[instrument(level = "trace", skip(self))]
    async fn get_discovery(
        &self,
        peer: &PeerUri,
    ) -> Result<DiscoveryHosts, Error> {
        let url = peer.join("discovery");
        let response = self.get(&url).await?;
        read_versioned(&url, response).await
    }

    #[instrument(level = "trace", skip(self))]
    async fn post_discovery(
        &self,
        peer: &PeerUri,
        registration: &DiscoveryRegistration,
    ) -> Result<(), Error> {
        self.post(&peer.join("discovery"), registration).await?;
        trace!("Registered to {}", peer);
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    async fn get_auctions(
        &self,
        peer: &PeerUri,
    ) -> Result<AuctionListing, Error> {
        let url = peer.join("auctions/");
        let response = self.get(&url).await?;
        let links = link_header::parse(
            response
                .headers()
                .get_all(LINK)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
        let body = response.bytes().await?;
        let auctions = match serde_json::from_slice::<AuctionContent>(&body)
            .map_err(|err| err.to_string())
            .and_then(|content| {
                content.into_payloads().map_err(|err| err.to_string())
            }) {
            Ok(auctions) => auctions,
            Err(err) => {
                warn!("Ignoring the auctions listed by {}: {}", url, err);
                vec![]
            }
        };
        Ok(AuctionListing { links, auctions })
    }

    #[instrument(level = "trace", skip(self, bid))]
    async fn post_bid(
        &self,
        auction_uri: &str,
        bid: &PostBid,
    ) -> Result<(), Error> {
        self.post(&format!("{}/bid", auction_uri), bid).await?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, assignment))]
    async fn post_job_assignment(
        &self,
        winner: &PeerUri,
        auction_id: &AuctionId,
        assignment: &JobAssignment,
    ) -> Result<(), Error> {
        let url = winner.join(&format!("bidders/{}/job", auction_id));
        self.post(&url, assignment).await?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, result))]
    async fn post_job_result(
        &self,
        house: &PeerUri,
        auction_id: &str,
        result: &PostJobResult,
    ) -> Result<(), Error> {
        let url = house.join(&format!("auctions/{}/job", auction_id));
        self.post(&url, result).await?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    async fn health(&self, peer: &PeerUri) -> Result<(), Error> {
        self.get(&peer.join("health")).await?;
        Ok(())
    }
}
