use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use model::domain::auction::{
    Auction, AuctionError, AuctionStatus, Bid, DeadlineOutcome,
    SelectionPolicy,
};
use model::dto::event::AuctionPayload;
use model::view::auction::{JobAssignment, JobPatch, JobStatus, PostAuction};
use model::{AuctionId, PeerUri};

use crate::repository::auction::AuctionStore;
use crate::repository::cron::{until, Cron, Task};
use crate::repository::job_store::JobStore;
use crate::repository::node_query::NodeQuery;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The auction {0} does not exist")]
    NotFound(AuctionId),
    #[error(transparent)]
    Auction(#[from] AuctionError),
}

/// Receives the auctions once they are opened, to announce them.
#[async_trait]
pub trait AuctionPublisher: Debug + Sync + Send {
    /// Must not fail nor wait on the network.
    async fn auction_opened(&self, auction: AuctionPayload);
}

/// What happens when the winner does not report in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AwardTimeoutPolicy {
    /// Only log it, the winner may still report.
    #[default]
    Report,
    /// Move the auction to FAILED and tell the job store.
    Fail,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown award timeout policy {0:?}, expected report or fail")]
pub struct UnknownAwardTimeoutPolicy(String);

impl FromStr for AwardTimeoutPolicy {
    type Err = UnknownAwardTimeoutPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(AwardTimeoutPolicy::Report),
            "fail" => Ok(AwardTimeoutPolicy::Fail),
            _ => Err(UnknownAwardTimeoutPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for AwardTimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AwardTimeoutPolicy::Report => write!(f, "report"),
            AwardTimeoutPolicy::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub winner_policy:        SelectionPolicy,
    pub award_timeout:        Duration,
    pub award_timeout_policy: AwardTimeoutPolicy,
}

/// Lifecycle of the auctions opened on this node.
#[derive(Debug)]
pub struct AuctionEngine {
    house:      PeerUri,
    store:      Arc<AuctionStore>,
    publisher:  Arc<dyn AuctionPublisher>,
    node_query: Arc<dyn NodeQuery>,
    job_store:  Arc<dyn JobStore>,
    cron:       Arc<Cron>,
    settings:   EngineSettings,
}

impl AuctionEngine {
    pub fn new(
        house: PeerUri,
        store: Arc<AuctionStore>,
        publisher: Arc<dyn AuctionPublisher>,
        node_query: Arc<dyn NodeQuery>,
        job_store: Arc<dyn JobStore>,
        cron: Arc<Cron>,
        settings: EngineSettings,
    ) -> Self {
        Self { house, store, publisher, node_query, job_store, cron, settings }
    }

    pub fn house(&self) -> &PeerUri { &self.house }

    /// Open the auction, arm its deadline and announce it.
    #[instrument(level = "trace", skip(self))]
    pub async fn open_auction(
        self: &Arc<Self>,
        request: PostAuction,
    ) -> Result<Auction, Error> {
        let now = Utc::now();
        let auction = Auction::open(
            request.job_uri,
            request.job_type,
            request.deadline,
            now,
        )?;
        let id = auction.id.clone();
        self.store.insert(auction.clone());

        let engine = self.clone();
        let timer_id = id.clone();
        self.cron
            .add_oneshot(
                until(auction.deadline),
                Task::AuctionDeadline(id.clone()),
                move || {
                    Box::pin(async move {
                        engine.on_deadline(&timer_id).await;
                    })
                },
            )
            .await;

        info!(
            "Opened auction {} for the {} job {}, closing at {}",
            id, auction.job_type, auction.job_uri, auction.deadline
        );
        self.publisher
            .auction_opened(AuctionPayload::from_auction(&auction, &self.house))
            .await;
        Ok(auction)
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn submit_bid(
        &self,
        id: &AuctionId,
        bidder_uri: PeerUri,
        bidder_name: Option<String>,
        value: f64,
    ) -> Result<(), Error> {
        let entry =
            self.store.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        let mut auction = entry.lock().await;
        let now = Utc::now();
        auction.submit_bid(
            Bid { bidder_uri, bidder_name, value, received_at: now },
            now,
        )?;
        debug!("Auction {} now has {} bids", id, auction.bids().len());
        Ok(())
    }

    /// Close the auction. Only the first call for an auction has an effect.
    #[instrument(level = "trace", skip(self))]
    pub async fn on_deadline(
        self: &Arc<Self>,
        id: &AuctionId,
    ) -> DeadlineOutcome {
        let Some(entry) = self.store.get(id) else {
            warn!("Deadline fired for the unknown auction {}", id);
            return DeadlineOutcome::AlreadyClosed;
        };
        let (outcome, job_uri, job_type) = {
            let mut auction = entry.lock().await;
            let outcome = auction.close(self.settings.winner_policy);
            (outcome, auction.job_uri.clone(), auction.job_type.clone())
        };

        match &outcome {
            DeadlineOutcome::AlreadyClosed => {
                trace!("Auction {} was already closed", id);
            }
            DeadlineOutcome::ExpiredNoBids => {
                info!("Auction {} expired without any bid", id);
            }
            DeadlineOutcome::Awarded(winner) => {
                info!(
                    "Auction {} awarded to {} for {}",
                    id, winner.bidder_uri, winner.value
                );
                self.notify_winner(id, winner, job_uri, job_type).await;
                self.arm_award_timeout(id).await;
            }
        }
        outcome
    }

    async fn notify_winner(
        &self,
        id: &AuctionId,
        winner: &Bid,
        job_uri: String,
        job_type: String,
    ) {
        let input_data = match self.job_store.get_job(&job_uri).await {
            Ok(job) => job.input_data,
            Err(err) => {
                warn!("Cannot read the input of the job {}: {}", job_uri, err);
                None
            }
        };
        let assignment = JobAssignment {
            auction_id: id.to_string(),
            auction_house_uri: self.house.clone(),
            job_uri: Some(job_uri),
            job_type,
            input_data,
        };
        if let Err(err) = self
            .node_query
            .post_job_assignment(&winner.bidder_uri, id, &assignment)
            .await
        {
            warn!(
                "Failed to notify {} that it won the auction {}: {}",
                winner.bidder_uri, id, err
            );
        }
    }

    async fn arm_award_timeout(self: &Arc<Self>, id: &AuctionId) {
        let engine = self.clone();
        let timer_id = id.clone();
        self.cron
            .add_oneshot(
                self.settings.award_timeout,
                Task::AwardTimeout(id.clone()),
                move || {
                    Box::pin(async move {
                        engine.on_award_timeout(&timer_id).await;
                    })
                },
            )
            .await;
    }

    /// The winner did not report within the award timeout.
    #[instrument(level = "trace", skip(self))]
    pub async fn on_award_timeout(&self, id: &AuctionId) {
        let Some(entry) = self.store.get(id) else {
            return;
        };
        let job_uri = {
            let mut auction = entry.lock().await;
            if auction.status() != AuctionStatus::Awarded {
                return;
            }
            match self.settings.award_timeout_policy {
                AwardTimeoutPolicy::Report => {
                    warn!(
                        "The winner of {} did not report after {:?}",
                        id, self.settings.award_timeout
                    );
                    return;
                }
                AwardTimeoutPolicy::Fail => {
                    auction.fail_award();
                    auction.job_uri.clone()
                }
            }
        };
        warn!("The auction {} failed, its winner never reported", id);
        self.patch_job(
            &job_uri,
            JobPatch { status: JobStatus::Failed, output_data: None },
        )
        .await;
    }

    /// Record the result sent by the winner and forward it to the job store.
    #[instrument(level = "trace", skip(self, output))]
    pub async fn report_result(
        &self,
        id: &AuctionId,
        bidder: &PeerUri,
        output: serde_json::Value,
    ) -> Result<(), Error> {
        let entry =
            self.store.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        let job_uri = {
            let mut auction = entry.lock().await;
            auction.complete(bidder, output.clone())?;
            auction.job_uri.clone()
        };
        info!("Auction {} completed by {}", id, bidder);
        self.patch_job(
            &job_uri,
            JobPatch { status: JobStatus::Executed, output_data: Some(output) },
        )
        .await;
        Ok(())
    }

    async fn patch_job(&self, job_uri: &str, patch: JobPatch) {
        if let Err(err) = self.job_store.patch_job(job_uri, &patch).await {
            warn!("Failed to update the job {}: {}", job_uri, err);
        }
    }

    pub async fn get_auction(&self, id: &AuctionId) -> Result<Auction, Error> {
        let entry =
            self.store.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        let auction = entry.lock().await.clone();
        Ok(auction)
    }

    /// Oldest first. Without `all`, only the auctions still open.
    pub async fn list_auctions(&self, all: bool) -> Vec<Auction> {
        let auctions = self.store.snapshot().await;
        if all {
            return auctions;
        }
        auctions
            .into_iter()
            .filter(|auction| auction.status() == AuctionStatus::Open)
            .collect()
    }
}
