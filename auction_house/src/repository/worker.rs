use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use helper::reqwest_helper::{
    deserialize_response, ensure_success, API_VERSION_HEADER,
};
use model::domain::assignment::RemoteAssignment;
use model::view::auction::JobAssignment;
use model::view::{Envelope, Versioned};
use model::API_VERSION;
use serde::Deserialize;

use super::HttpClient;

/// Executes the jobs this node won.
#[async_trait]
pub trait Worker: Debug + Sync + Send {
    /// Returns the output of the job.
    async fn execute(
        &self,
        assignment: &RemoteAssignment,
    ) -> Result<serde_json::Value>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkerOutput {
    #[serde(default)]
    output_data: serde_json::Value,
}

#[derive(Debug)]
pub struct WorkerRESTImpl {
    client: Arc<HttpClient>,
    uri:    String,
}

impl WorkerRESTImpl {
    pub fn new(client: Arc<HttpClient>, uri: String) -> Self {
        Self { client, uri }
    }
}

#[async_trait]
impl Worker for WorkerRESTImpl {
    #[instrument(
        level = "trace",
        skip(self, assignment),
        fields(auction_id = %assignment.auction_id)
    )]
    async fn execute(
        &self,
        assignment: &RemoteAssignment,
    ) -> Result<serde_json::Value> {
        let job = JobAssignment {
            auction_id:        assignment.auction_id.clone(),
            auction_house_uri: assignment.auction_house_uri.clone(),
            job_uri:           assignment.job_uri.clone(),
            job_type:          assignment.job_type.clone(),
            input_data:        assignment.input_data.clone(),
        };
        let response = self
            .client
            .post(&self.uri)
            .header(API_VERSION_HEADER, API_VERSION.to_string())
            .json(&Envelope::new(job))
            .send()
            .await
            .with_context(|| {
                format!("Failed to reach the worker {}", self.uri)
            })?;
        let response = ensure_success(response).await?;
        let output: Versioned<WorkerOutput> = deserialize_response(response)
            .await
            .context("The worker answered with an unexpected body")?;
        Ok(output.into_checked()?.output_data)
    }
}
