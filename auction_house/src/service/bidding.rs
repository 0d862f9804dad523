use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backoff::exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
use backoff::SystemClock;
use chrono::{DateTime, Utc};
use model::domain::assignment::RemoteAssignment;
use model::dto::event::AuctionPayload;
use model::view::auction::{JobAssignment, JobStatus, PostBid, PostJobResult};
use model::PeerUri;

use crate::repository::assignment::AssignmentStore;
use crate::repository::node_query::NodeQuery;
use crate::repository::worker::Worker;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "The assignment is for the auction {body}, but was sent for {path}"
    )]
    AuctionMismatch { path: String, body: String },
}

#[derive(Debug, Clone)]
pub struct BiddingSettings {
    /// Empty means every job type.
    pub supported_job_types: HashSet<String>,
    pub bidder_name:         String,
    pub bid_value:           f64,
    pub retry_initial:       Duration,
    /// The result of a job is given up after this long.
    pub retry_max_elapsed:   Duration,
}

/// Bids on the auctions of the peers and takes care of the jobs won.
#[derive(Debug)]
pub struct BiddingClient {
    house:       PeerUri,
    settings:    BiddingSettings,
    node_query:  Arc<dyn NodeQuery>,
    worker:      Option<Arc<dyn Worker>>,
    assignments: Arc<AssignmentStore>,
}

impl BiddingClient {
    pub fn new(
        house: PeerUri,
        settings: BiddingSettings,
        node_query: Arc<dyn NodeQuery>,
        worker: Option<Arc<dyn Worker>>,
        assignments: Arc<AssignmentStore>,
    ) -> Self {
        Self { house, settings, node_query, worker, assignments }
    }

    pub fn wants(&self, auction: &AuctionPayload, now: DateTime<Utc>) -> bool {
        if auction.auction_house_uri == self.house {
            return false;
        }
        let supported = &self.settings.supported_job_types;
        if !supported.is_empty()
            && !supported.contains(auction.job_type.trim())
        {
            return false;
        }
        auction.is_open_at(now)
    }

    /// Bid on the auction if it is worth it. Returns whether a bid was
    /// accepted by the auction house.
    #[instrument(
        level = "trace",
        skip(self, auction),
        fields(auction_uri = %auction.auction_uri())
    )]
    pub async fn consider(&self, auction: AuctionPayload) -> bool {
        if !self.wants(&auction, Utc::now()) {
            trace!("Not bidding on {}", auction.auction_uri());
            return false;
        }
        let bid = PostBid {
            bidder_uri:  self.house.to_string(),
            bidder_name: Some(self.settings.bidder_name.clone()),
            bid_value:   self.settings.bid_value,
            auction_id:  Some(auction.auction_id.clone()),
        };
        match self.node_query.post_bid(&auction.auction_uri(), &bid).await {
            Ok(()) => {
                info!(
                    "Bid {} on {} ({})",
                    bid.bid_value,
                    auction.auction_uri(),
                    auction.job_type
                );
                true
            }
            Err(err) => {
                warn!("Bid on {} failed: {}", auction.auction_uri(), err);
                false
            }
        }
    }

    /// Record a job won on another auction house, then run it on the
    /// worker when there is one. Returns whether the assignment is new.
    #[instrument(level = "trace", skip(self, assignment))]
    pub fn accept_assignment(
        self: &Arc<Self>,
        auction_id: &str,
        assignment: JobAssignment,
    ) -> Result<bool, Error> {
        if assignment.auction_id.trim() != auction_id.trim() {
            return Err(Error::AuctionMismatch {
                path: auction_id.to_string(),
                body: assignment.auction_id,
            });
        }
        let assignment = RemoteAssignment::from(assignment);
        if !self.assignments.insert(assignment.clone()) {
            debug!("Assignment for {} already received", auction_id);
            return Ok(false);
        }
        info!(
            "Won the auction {} of {}",
            assignment.auction_id, assignment.auction_house_uri
        );

        if let Some(worker) = &self.worker {
            let worker = worker.clone();
            let client = self.clone();
            tokio::spawn(async move {
                client.run_assignment(worker, assignment).await;
            });
        }
        Ok(true)
    }

    async fn run_assignment(
        &self,
        worker: Arc<dyn Worker>,
        assignment: RemoteAssignment,
    ) {
        let output = match worker.execute(&assignment).await {
            Ok(output) => output,
            Err(err) => {
                warn!(
                    "Worker failed on the auction {}: {:?}",
                    assignment.auction_id, err
                );
                self.assignments.finish(&assignment, JobStatus::Failed, None);
                return;
            }
        };

        let result = PostJobResult {
            bidder_uri:  self.house.to_string(),
            output_data: output.clone(),
            status:      Some(JobStatus::Executed),
        };
        let res = backoff::future::retry(self.get_backoff(), || async {
            self.node_query
                .post_job_result(
                    &assignment.auction_house_uri,
                    &assignment.auction_id,
                    &result,
                )
                .await
                .map_err(|err| {
                    debug!(
                        "{} refused the result of {}: {}",
                        assignment.auction_house_uri, assignment.auction_id, err
                    );
                    backoff::Error::transient(err)
                })
        })
        .await;
        match res {
            Ok(()) => self.assignments.finish(
                &assignment,
                JobStatus::Executed,
                Some(output),
            ),
            Err(err) => {
                warn!(
                    "Gave up reporting the result of {} to {}: {}",
                    assignment.auction_id, assignment.auction_house_uri, err
                );
                // Output kept so the job can be looked at
                self.assignments.finish(
                    &assignment,
                    JobStatus::Failed,
                    Some(output),
                );
            }
        }
    }

    fn get_backoff(&self) -> ExponentialBackoff<SystemClock> {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(self.settings.retry_initial)
            .with_max_elapsed_time(Some(self.settings.retry_max_elapsed))
            .build()
    }

    pub fn list_assignments(&self) -> Vec<RemoteAssignment> {
        self.assignments.list()
    }
}
