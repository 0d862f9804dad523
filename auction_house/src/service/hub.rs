use std::sync::Arc;

use futures::future::join_all;
use model::domain::subscription::Subscription;
use model::is_absolute_uri;
use model::view::websub::{HubMode, HubRequest, VerificationQuery};
use uuid::Uuid;

use crate::repository::hub_client::HubClient;
use crate::repository::subscription::SubscriptionStore;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("hub.mode is missing")]
    MissingMode,
    #[error("Unknown hub.mode {0:?}")]
    UnknownMode(String),
    #[error("{0} is required for this hub.mode")]
    MissingField(&'static str),
    #[error("{field} is not an absolute URI: {value:?}")]
    InvalidUri { field: &'static str, value: String },
}

fn required(
    value: Option<String>,
    field: &'static str,
) -> Result<String, Error> {
    let value = value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(Error::MissingField(field))?;
    if !is_absolute_uri(&value) {
        return Err(Error::InvalidUri { field, value });
    }
    Ok(value)
}

/// WebSub hub served by the node itself when no external one is configured.
/// Requests are accepted right away, the verification and the distribution
/// happen on their own tasks.
#[derive(Debug)]
pub struct EmbeddedHub {
    hub_uri:       String,
    hub_client:    Arc<dyn HubClient>,
    subscriptions: Arc<SubscriptionStore>,
}

impl EmbeddedHub {
    pub fn new(
        hub_uri: String,
        hub_client: Arc<dyn HubClient>,
        subscriptions: Arc<SubscriptionStore>,
    ) -> Self {
        Self { hub_uri, hub_client, subscriptions }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn accept(
        self: &Arc<Self>,
        request: HubRequest,
    ) -> Result<HubMode, Error> {
        let raw_mode = request.mode.ok_or(Error::MissingMode)?;
        let mode = HubMode::parse(&raw_mode)
            .ok_or_else(|| Error::UnknownMode(raw_mode.clone()))?;

        let hub = self.clone();
        match mode {
            HubMode::Subscribe => {
                let topic = required(request.topic, "hub.topic")?;
                let callback = required(request.callback, "hub.callback")?;
                let challenge = Uuid::new_v4().simple().to_string();
                self.subscriptions.upsert_pending(Subscription::pending(
                    topic.clone(),
                    callback.clone(),
                    Some(challenge),
                    request.lease_seconds,
                ));
                tokio::spawn(async move {
                    hub.verify_subscription(&topic, &callback).await;
                });
            }
            HubMode::Unsubscribe => {
                let topic = required(request.topic, "hub.topic")?;
                let callback = required(request.callback, "hub.callback")?;
                tokio::spawn(async move {
                    hub.verify_unsubscription(&topic, &callback).await;
                });
            }
            HubMode::Publish => {
                let topic = required(request.url.or(request.topic), "hub.url")?;
                tokio::spawn(async move {
                    hub.distribute(&topic).await;
                });
            }
        }
        Ok(mode)
    }

    /// Confirm the pending subscription if the callback echoes the challenge,
    /// drop it otherwise.
    #[instrument(level = "trace", skip(self))]
    pub async fn verify_subscription(
        &self,
        topic: &str,
        callback: &str,
    ) -> bool {
        let Some(pending) = self.subscriptions.get(topic, callback) else {
            return false;
        };
        let Some(challenge) = pending.challenge else {
            return false;
        };
        let query = VerificationQuery {
            mode: HubMode::Subscribe,
            topic: topic.to_string(),
            challenge,
            lease_seconds: pending.lease_seconds,
        };
        match self.hub_client.verify_intent(callback, &query).await {
            Ok(echoed)
                if self.subscriptions.confirm_with(topic, callback, &echoed) =>
            {
                info!("{} subscribed to {}", callback, topic);
                return true;
            }
            Ok(_) => {
                warn!("{} did not echo the challenge for {}", callback, topic)
            }
            Err(err) => {
                warn!("Cannot verify {} for {}: {}", callback, topic, err)
            }
        }
        self.subscriptions.remove(topic, callback);
        false
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn verify_unsubscription(
        &self,
        topic: &str,
        callback: &str,
    ) -> bool {
        let query = VerificationQuery {
            mode:          HubMode::Unsubscribe,
            topic:         topic.to_string(),
            challenge:     Uuid::new_v4().simple().to_string(),
            lease_seconds: None,
        };
        match self.hub_client.verify_intent(callback, &query).await {
            Ok(echoed) if echoed == query.challenge => {
                if self.subscriptions.remove(topic, callback).is_some() {
                    info!("{} unsubscribed from {}", callback, topic);
                }
                true
            }
            Ok(_) => {
                debug!("{} refused to unsubscribe from {}", callback, topic);
                false
            }
            Err(err) => {
                warn!("Cannot verify {} for {}: {}", callback, topic, err);
                false
            }
        }
    }

    /// Fetch the topic and push it to every confirmed subscriber. Returns the
    /// number of successful deliveries.
    #[instrument(level = "trace", skip(self))]
    pub async fn distribute(&self, topic: &str) -> usize {
        let subscribers = self.subscriptions.confirmed_for(topic);
        if subscribers.is_empty() {
            trace!("Nobody subscribed to {}", topic);
            return 0;
        }
        let content = match self.hub_client.fetch_topic(topic).await {
            Ok(content) => content,
            Err(err) => {
                warn!("Cannot fetch the topic {}: {}", topic, err);
                return 0;
            }
        };

        let deliveries = subscribers.iter().map(|sub| {
            self.hub_client.push(
                &sub.callback_uri,
                &self.hub_uri,
                topic,
                &content,
            )
        });
        let mut delivered = 0;
        for (sub, res) in subscribers.iter().zip(join_all(deliveries).await) {
            match res {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    "Push of {} to {} failed: {}",
                    topic, sub.callback_uri, err
                ),
            }
        }
        debug!(
            "Pushed {} to {}/{} subscribers",
            topic,
            delivered,
            subscribers.len()
        );
        delivered
    }
}
