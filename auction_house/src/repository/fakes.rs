//! In-memory doubles of the outbound clients, recording every call.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use model::domain::assignment::RemoteAssignment;
use model::dto::event::{AuctionMessage, AuctionPayload};
use model::view::auction::{
    JobAssignment, JobPatch, JobView, PostBid, PostJobResult,
};
use model::view::discovery::{
    DiscoveryHost, DiscoveryHosts, DiscoveryRegistration,
};
use model::view::websub::VerificationQuery;
use model::{AuctionId, PeerUri, RingType};

use super::broker::{self, MessageBroker};
use super::hub_client::{self, HubClient, TopicContent};
use super::job_store::{self, JobStore};
use super::node_query::{self, AuctionListing, NodeQuery};
use super::worker::Worker;
use crate::service::auction::AuctionPublisher;

pub fn uri(raw: &str) -> PeerUri { PeerUri::try_new(raw.to_string()).unwrap() }

fn unavailable(url: &str) -> node_query::Error {
    node_query::Error::RequestStatus {
        url:    url.to_string(),
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Debug, Default)]
pub struct FakeNodeQuery {
    pub discovery:       Mutex<HashMap<PeerUri, DiscoveryHosts>>,
    pub listings:        Mutex<HashMap<PeerUri, AuctionListing>>,
    pub unreachable:     Mutex<HashSet<PeerUri>>,
    pub discovery_gets:  Mutex<Vec<PeerUri>>,
    pub registrations:   Mutex<Vec<(PeerUri, DiscoveryRegistration)>>,
    pub bids:            Mutex<Vec<(String, PostBid)>>,
    pub assignments:     Mutex<Vec<(PeerUri, AuctionId, JobAssignment)>>,
    pub results:         Mutex<Vec<(PeerUri, String, PostJobResult)>>,
    pub result_attempts: AtomicUsize,
}

impl FakeNodeQuery {
    /// `peer` answers discovery requests with the given hosts.
    pub fn knows(&self, peer: &str, ring_type: RingType, hosts: &[&str]) {
        self.discovery.lock().unwrap().insert(
            uri(peer),
            DiscoveryHosts {
                ring_type,
                hosts: hosts
                    .iter()
                    .map(|host| DiscoveryHost {
                        auction_house_uri: host.to_string(),
                    })
                    .collect(),
            },
        );
    }

    fn reachable(&self, peer: &PeerUri) -> Result<(), node_query::Error> {
        if self.unreachable.lock().unwrap().contains(peer) {
            return Err(unavailable(peer.as_str()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeQuery for FakeNodeQuery {
    async fn get_discovery(
        &self,
        peer: &PeerUri,
    ) -> Result<DiscoveryHosts, node_query::Error> {
        self.discovery_gets.lock().unwrap().push(peer.clone());
        self.reachable(peer)?;
        self.discovery
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .ok_or_else(|| unavailable(peer.as_str()))
    }

    async fn post_discovery(
        &self,
        peer: &PeerUri,
        registration: &DiscoveryRegistration,
    ) -> Result<(), node_query::Error> {
        self.reachable(peer)?;
        self.registrations
            .lock()
            .unwrap()
            .push((peer.clone(), registration.clone()));
        Ok(())
    }

    async fn get_auctions(
        &self,
        peer: &PeerUri,
    ) -> Result<AuctionListing, node_query::Error> {
        self.reachable(peer)?;
        self.listings
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .ok_or_else(|| unavailable(peer.as_str()))
    }

    async fn post_bid(
        &self,
        auction_uri: &str,
        bid: &PostBid,
    ) -> Result<(), node_query::Error> {
        self.bids
            .lock()
            .unwrap()
            .push((auction_uri.to_string(), bid.clone()));
        Ok(())
    }

    async fn post_job_assignment(
        &self,
        winner: &PeerUri,
        auction_id: &AuctionId,
        assignment: &JobAssignment,
    ) -> Result<(), node_query::Error> {
        self.reachable(winner)?;
        self.assignments.lock().unwrap().push((
            winner.clone(),
            auction_id.clone(),
            assignment.clone(),
        ));
        Ok(())
    }

    async fn post_job_result(
        &self,
        house: &PeerUri,
        auction_id: &str,
        result: &PostJobResult,
    ) -> Result<(), node_query::Error> {
        self.result_attempts.fetch_add(1, Ordering::SeqCst);
        self.reachable(house)?;
        self.results.lock().unwrap().push((
            house.clone(),
            auction_id.to_string(),
            result.clone(),
        ));
        Ok(())
    }

    async fn health(&self, peer: &PeerUri) -> Result<(), node_query::Error> {
        self.reachable(peer)
    }
}

/// How the fake subscriber callbacks answer intent verifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Echo {
    #[default]
    Challenge,
    Wrong,
    Unreachable,
}

#[derive(Debug, Default)]
pub struct FakeHubClient {
    pub echo:             Mutex<Echo>,
    /// Number of publish calls failing before one succeeds.
    pub publish_failures: AtomicUsize,
    pub publishes:        Mutex<Vec<(String, String)>>,
    pub subscribes:       Mutex<Vec<(String, String, String)>>,
    pub verifications:    Mutex<Vec<(String, VerificationQuery)>>,
    pub pushes:           Mutex<Vec<(String, TopicContent)>>,
}

fn hub_unavailable(url: &str) -> hub_client::Error {
    hub_client::Error::RequestStatus {
        url:    url.to_string(),
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[async_trait]
impl HubClient for FakeHubClient {
    async fn publish(
        &self,
        hub: &str,
        topic: &str,
    ) -> Result<(), hub_client::Error> {
        let failing = self
            .publish_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(hub_unavailable(hub));
        }
        self.publishes
            .lock()
            .unwrap()
            .push((hub.to_string(), topic.to_string()));
        Ok(())
    }

    async fn subscribe(
        &self,
        hub: &str,
        topic: &str,
        callback: &str,
    ) -> Result<(), hub_client::Error> {
        self.subscribes.lock().unwrap().push((
            hub.to_string(),
            topic.to_string(),
            callback.to_string(),
        ));
        Ok(())
    }

    async fn verify_intent(
        &self,
        callback: &str,
        query: &VerificationQuery,
    ) -> Result<String, hub_client::Error> {
        self.verifications
            .lock()
            .unwrap()
            .push((callback.to_string(), query.clone()));
        let echo = *self.echo.lock().unwrap();
        match echo {
            Echo::Challenge => Ok(query.challenge.clone()),
            Echo::Wrong => Ok(format!("not-{}", query.challenge)),
            Echo::Unreachable => Err(hub_unavailable(callback)),
        }
    }

    async fn fetch_topic(
        &self,
        topic: &str,
    ) -> Result<TopicContent, hub_client::Error> {
        Ok(TopicContent {
            content_type: Some("application/json".to_string()),
            body:         Bytes::from(format!("{{\"topic\": \"{}\"}}", topic)),
        })
    }

    async fn push(
        &self,
        callback: &str,
        _hub: &str,
        _topic: &str,
        content: &TopicContent,
    ) -> Result<(), hub_client::Error> {
        self.pushes
            .lock()
            .unwrap()
            .push((callback.to_string(), content.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeBroker {
    pub published: Mutex<Vec<AuctionMessage>>,
}

#[async_trait]
impl MessageBroker for FakeBroker {
    async fn publish(
        &self,
        message: &AuctionMessage,
    ) -> Result<(), broker::Error> {
        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeJobStore {
    pub jobs:    Mutex<HashMap<String, JobView>>,
    pub patches: Mutex<Vec<(String, JobPatch)>>,
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn get_job(
        &self,
        job_uri: &str,
    ) -> Result<JobView, job_store::Error> {
        self.jobs.lock().unwrap().get(job_uri).cloned().ok_or_else(|| {
            job_store::Error::RequestStatus {
                job_uri: job_uri.to_string(),
                status:  reqwest::StatusCode::NOT_FOUND,
            }
        })
    }

    async fn patch_job(
        &self,
        job_uri: &str,
        patch: &JobPatch,
    ) -> Result<(), job_store::Error> {
        self.patches
            .lock()
            .unwrap()
            .push((job_uri.to_string(), patch.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakePublisher {
    pub opened: Mutex<Vec<AuctionPayload>>,
}

#[async_trait]
impl AuctionPublisher for FakePublisher {
    async fn auction_opened(&self, auction: AuctionPayload) {
        self.opened.lock().unwrap().push(auction);
    }
}

#[derive(Debug)]
pub struct FakeWorker {
    pub output:   serde_json::Value,
    pub executed: Mutex<Vec<RemoteAssignment>>,
}

#[async_trait]
impl Worker for FakeWorker {
    async fn execute(
        &self,
        assignment: &RemoteAssignment,
    ) -> anyhow::Result<serde_json::Value> {
        self.executed.lock().unwrap().push(assignment.clone());
        Ok(self.output.clone())
    }
}
