use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use helper::reqwest_helper::API_VERSION_HEADER;
use model::view::auction::{JobPatch, JobView};
use model::view::{Envelope, UnsupportedVersion, Versioned};
use model::API_VERSION;

use super::HttpClient;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),
    #[error("The job store answered {status} for {job_uri}")]
    RequestStatus { job_uri: String, status: reqwest::StatusCode },
    #[error("Failed to read the job {job_uri}: {source}")]
    Body { job_uri: String, source: serde_json::Error },
    #[error(transparent)]
    Version(#[from] UnsupportedVersion),
}

/// The external service owning the job definitions.
#[async_trait]
pub trait JobStore: Debug + Sync + Send {
    async fn get_job(&self, job_uri: &str) -> Result<JobView, Error>;
    async fn patch_job(&self, job_uri: &str, patch: &JobPatch)
        -> Result<(), Error>;
}

#[derive(Debug)]
pub struct JobStoreRESTImpl {
    client: Arc<HttpClient>,
}

impl JobStoreRESTImpl {
    pub fn new(client: Arc<HttpClient>) -> Self { Self { client } }
}

#[async_trait]
impl JobStore for JobStoreRESTImpl {
    #[instrument(level = "trace", skip(self))]
    async fn get_job(&self, job_uri: &str) -> Result<JobView, Error> {
        let response = self
            .client
            .get(job_uri)
            .header(API_VERSION_HEADER, API_VERSION.to_string())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::RequestStatus {
                job_uri: job_uri.to_string(),
                status:  response.status(),
            });
        }
        let body = response.bytes().await?;
        let job: Versioned<JobView> = serde_json::from_slice(&body).map_err(
            |source| Error::Body { job_uri: job_uri.to_string(), source },
        )?;
        Ok(job.into_checked()?)
    }

    #[instrument(level = "trace", skip(self))]
    async fn patch_job(
        &self,
        job_uri: &str,
        patch: &JobPatch,
    ) -> Result<(), Error> {
        let response = self
            .client
            .patch(job_uri)
            .header(API_VERSION_HEADER, API_VERSION.to_string())
            .json(&Envelope::new(patch))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::RequestStatus {
                job_uri: job_uri.to_string(),
                status:  response.status(),
            });
        }
        Ok(())
    }
}
