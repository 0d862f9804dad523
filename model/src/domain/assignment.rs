use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::view::auction::{JobAssignment, JobStatus};
use crate::PeerUri;

/// A job this node won on another auction house.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAssignment {
    pub auction_id:        String,
    pub auction_house_uri: PeerUri,
    pub job_uri:           Option<String>,
    pub job_type:          String,
    pub input_data:        Option<serde_json::Value>,
    pub output_data:       Option<serde_json::Value>,
    pub status:            JobStatus,
    pub received_at:       DateTime<Utc>,
}

impl From<JobAssignment> for RemoteAssignment {
    fn from(assignment: JobAssignment) -> Self {
        Self {
            auction_id:        assignment.auction_id,
            auction_house_uri: assignment.auction_house_uri,
            job_uri:           assignment.job_uri,
            job_type:          assignment.job_type,
            input_data:        assignment.input_data,
            output_data:       None,
            status:            JobStatus::Open,
            received_at:       Utc::now(),
        }
    }
}
