use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{is_absolute_uri, AuctionId, PeerUri};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AuctionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("The auction {0} is closed to bids")]
    Closed(AuctionId),
    #[error("The auction {id} is {status}, not awarded")]
    NotAwarded { id: AuctionId, status: AuctionStatus },
    #[error("{bidder} is not the winner of the auction {id}")]
    NotWinner { id: AuctionId, bidder: PeerUri },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Open,
    Awarded,
    Completed,
    ExpiredNoBids,
    /// The winner never reported and the award timed out.
    Failed,
}

impl AuctionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuctionStatus::Completed
                | AuctionStatus::ExpiredNoBids
                | AuctionStatus::Failed
        )
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AuctionStatus::Open => "OPEN",
            AuctionStatus::Awarded => "AWARDED",
            AuctionStatus::Completed => "COMPLETED",
            AuctionStatus::ExpiredNoBids => "EXPIRED_NO_BIDS",
            AuctionStatus::Failed => "FAILED",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub bidder_uri:  PeerUri,
    pub bidder_name: Option<String>,
    pub value:       f64,
    pub received_at: DateTime<Utc>,
}

/// How the winner is elected among the bids of a closed auction. Ties are
/// always broken by the earliest reception, then by arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    #[default]
    HighestBid,
    LowestBid,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown winner policy {0:?}, expected highest or lowest")]
pub struct UnknownSelectionPolicy(String);

impl FromStr for SelectionPolicy {
    type Err = UnknownSelectionPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" => Ok(SelectionPolicy::HighestBid),
            "lowest" => Ok(SelectionPolicy::LowestBid),
            _ => Err(UnknownSelectionPolicy(s.to_string())),
        }
    }
}

impl SelectionPolicy {
    pub fn select<'a>(&self, bids: &'a [Bid]) -> Option<&'a Bid> {
        bids.iter()
            .enumerate()
            .min_by(|(index_a, a), (index_b, b)| {
                let by_value = match self {
                    SelectionPolicy::HighestBid => b.value.total_cmp(&a.value),
                    SelectionPolicy::LowestBid => a.value.total_cmp(&b.value),
                };
                by_value
                    .then(a.received_at.cmp(&b.received_at))
                    .then(index_a.cmp(index_b))
            })
            .map(|(_, bid)| bid)
    }
}

/// What closing an auction at its deadline led to.
#[derive(Debug, Clone, PartialEq)]
pub enum DeadlineOutcome {
    /// The auction was not open anymore, nothing changed.
    AlreadyClosed,
    ExpiredNoBids,
    Awarded(Bid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id:         AuctionId,
    pub job_uri:    String,
    pub job_type:   String,
    pub deadline:   DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    status:         AuctionStatus,
    bids:           Vec<Bid>,
    winner:         Option<Bid>,
    result:         Option<serde_json::Value>,
}

impl Auction {
    pub fn open(
        job_uri: String,
        job_type: String,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, AuctionError> {
        let job_uri = job_uri.trim().to_string();
        if job_uri.is_empty() {
            return Err(AuctionError::InvalidRequest(
                "jobUri is required".to_string(),
            ));
        }
        if !is_absolute_uri(&job_uri) {
            return Err(AuctionError::InvalidRequest(format!(
                "jobUri must be an absolute URI, got {:?}",
                job_uri
            )));
        }
        let job_type = job_type.trim().to_string();
        if job_type.is_empty() {
            return Err(AuctionError::InvalidRequest(
                "jobType is required".to_string(),
            ));
        }
        if deadline <= now {
            return Err(AuctionError::InvalidRequest(format!(
                "deadline {} is not in the future",
                deadline
            )));
        }

        Ok(Self {
            id: AuctionId::new_random(),
            job_uri,
            job_type,
            deadline,
            created_at: now,
            status: AuctionStatus::Open,
            bids: vec![],
            winner: None,
            result: None,
        })
    }

    pub fn status(&self) -> AuctionStatus { self.status }

    pub fn bids(&self) -> &[Bid] { &self.bids }

    pub fn winner(&self) -> Option<&Bid> { self.winner.as_ref() }

    pub fn result(&self) -> Option<&serde_json::Value> { self.result.as_ref() }

    /// Open and the deadline is not reached yet.
    pub fn accepts_bids(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Open && now < self.deadline
    }

    pub fn submit_bid(
        &mut self,
        bid: Bid,
        now: DateTime<Utc>,
    ) -> Result<(), AuctionError> {
        if !bid.value.is_finite() {
            return Err(AuctionError::InvalidRequest(format!(
                "bidValue must be a finite number, got {}",
                bid.value
            )));
        }
        if !self.accepts_bids(now) {
            return Err(AuctionError::Closed(self.id.clone()));
        }
        self.bids.push(bid);
        Ok(())
    }

    /// Close the auction. Only the first call changes anything.
    pub fn close(&mut self, policy: SelectionPolicy) -> DeadlineOutcome {
        if self.status != AuctionStatus::Open {
            return DeadlineOutcome::AlreadyClosed;
        }
        match policy.select(&self.bids).cloned() {
            None => {
                self.status = AuctionStatus::ExpiredNoBids;
                DeadlineOutcome::ExpiredNoBids
            }
            Some(winner) => {
                self.status = AuctionStatus::Awarded;
                self.winner = Some(winner.clone());
                DeadlineOutcome::Awarded(winner)
            }
        }
    }

    pub fn complete(
        &mut self,
        bidder: &PeerUri,
        output: serde_json::Value,
    ) -> Result<(), AuctionError> {
        let Some(winner) = &self.winner else {
            return Err(AuctionError::NotAwarded {
                id:     self.id.clone(),
                status: self.status,
            });
        };
        if &winner.bidder_uri != bidder {
            return Err(AuctionError::NotWinner {
                id:     self.id.clone(),
                bidder: bidder.clone(),
            });
        }
        if self.status != AuctionStatus::Awarded {
            return Err(AuctionError::NotAwarded {
                id:     self.id.clone(),
                status: self.status,
            });
        }
        self.status = AuctionStatus::Completed;
        self.result = Some(output);
        Ok(())
    }

    /// The winner did not report in time. Returns whether the auction moved
    /// to [`AuctionStatus::Failed`].
    pub fn fail_award(&mut self) -> bool {
        if self.status != AuctionStatus::Awarded {
            return false;
        }
        self.status = AuctionStatus::Failed;
        true
    }
}
