use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use helper::link_header::Link;
use helper::reqwest_helper::API_VERSION_HEADER;
use model::view::websub::VerificationQuery;
use model::API_VERSION;
use reqwest::header::{CONTENT_TYPE, LINK};
use reqwest::Response;

use super::HttpClient;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),
    #[error("{url} answered with error code {status}")]
    RequestStatus { url: String, status: reqwest::StatusCode },
}

/// The content of a topic, as fetched from its publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicContent {
    pub content_type: Option<String>,
    pub body:         Bytes,
}

/// WebSub calls, both as a publisher/subscriber talking to a hub and as the
/// embedded hub talking to subscribers.
#[async_trait]
pub trait HubClient: Debug + Sync + Send {
    async fn publish(&self, hub: &str, topic: &str) -> Result<(), Error>;
    async fn subscribe(
        &self,
        hub: &str,
        topic: &str,
        callback: &str,
    ) -> Result<(), Error>;
    /// Intent verification, returns the body answered by the callback.
    async fn verify_intent(
        &self,
        callback: &str,
        query: &VerificationQuery,
    ) -> Result<String, Error>;
    async fn fetch_topic(&self, topic: &str) -> Result<TopicContent, Error>;
    async fn push(
        &self,
        callback: &str,
        hub: &str,
        topic: &str,
        content: &TopicContent,
    ) -> Result<(), Error>;
}

#[derive(Debug)]
pub struct HubClientRESTImpl {
    client: Arc<HttpClient>,
}

impl HubClientRESTImpl {
    pub fn new(client: Arc<HttpClient>) -> Self { Self { client } }
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

#[async_trait]
impl HubClient for HubClientRESTImpl {
    #[instrument(level = "trace", skip(self))]
    async fn publish(&self, hub: &str, topic: &str) -> Result<(), Error> {
        let response = self
            .client
            .post(hub)
            .form(&[
                ("hub.mode", "publish"),
                ("hub.url", topic),
                ("hub.topic", topic),
            ])
            .send()
            .await?;
        check_status(hub, response)?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    async fn subscribe(
        &self,
        hub: &str,
        topic: &str,
        callback: &str,
    ) -> Result<(), Error> {
        let response = self
            .client
            .post(hub)
            .form(&[
                ("hub.mode", "subscribe"),
                ("hub.topic", topic),
                ("hub.callback", callback),
            ])
            .send()
            .await?;
        check_status(hub, response)?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    async fn verify_intent(
        &self,
        callback: &str,
        query: &VerificationQuery,
    ) -> Result<String, Error> {
        let response = self.client.get(callback).query(query).send().await?;
        let response = check_status(callback, response)?;
        Ok(response.text().await?)
    }

    #[instrument(level = "trace", skip(self))]
    async fn fetch_topic(&self, topic: &str) -> Result<TopicContent, Error> {
        let response = self
            .client
            .get(topic)
            .header(API_VERSION_HEADER, API_VERSION.to_string())
            .send()
            .await?;
        let response = check_status(topic, response)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(TopicContent { content_type, body: response.bytes().await? })
    }

    #[instrument(level = "trace", skip(self, content))]
    async fn push(
        &self,
        callback: &str,
        hub: &str,
        topic: &str,
        content: &TopicContent,
    ) -> Result<(), Error> {
        let content_type = content
            .content_type
            .clone()
            .unwrap_or_else(|| "application/json".to_string());
        let response = self
            .client
            .post(callback)
            .header(CONTENT_TYPE, content_type)
            .header(API_VERSION_HEADER, API_VERSION.to_string())
            .header(LINK, Link::new(hub, "hub").to_header_value())
            .header(LINK, Link::new(topic, "self").to_header_value())
            .body(content.body.clone())
            .send()
            .await?;
        check_status(callback, response)?;
        Ok(())
    }
}
