use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use model::dto::event::{
    AuctionContent, AuctionMessage, InboundEvent, InboundTransport,
};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] rumqttc::ClientError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// The shared topic every auction house of the federation listens to.
#[async_trait]
pub trait MessageBroker: Debug + Sync + Send {
    async fn publish(&self, message: &AuctionMessage) -> Result<(), Error>;
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host:      String,
    pub port:      u16,
    pub topic:     String,
    pub client_id: String,
    pub username:  Option<String>,
    pub password:  Option<String>,
}

#[derive(Debug)]
pub struct MqttBroker {
    client: AsyncClient,
    topic:  String,
}

impl MqttBroker {
    /// The returned event loop must be driven with [`run_event_loop`] for
    /// anything to be sent or received.
    pub fn new(settings: &MqttSettings) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.host.clone(),
            settings.port,
        );
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(username), Some(password)) =
            (&settings.username, &settings.password)
        {
            options.set_credentials(username.clone(), password.clone());
        }
        let (client, event_loop) = AsyncClient::new(options, 64);
        (Self { client, topic: settings.topic.clone() }, event_loop)
    }

    pub fn client(&self) -> AsyncClient { self.client.clone() }
}

#[async_trait]
impl MessageBroker for MqttBroker {
    #[instrument(level = "trace", skip(self, message))]
    async fn publish(&self, message: &AuctionMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// Turn a broker message into inbound events. Unreadable messages are
/// dropped.
pub fn decode_message(payload: &[u8]) -> Vec<InboundEvent> {
    let content = match serde_json::from_slice::<AuctionContent>(payload) {
        Ok(content) => content,
        Err(err) => {
            warn!("Received an unreadable broker message: {}", err);
            return vec![];
        }
    };
    match content.into_payloads() {
        Ok(payloads) => payloads
            .into_iter()
            .map(|payload| InboundEvent {
                payload,
                transport: InboundTransport::Broker,
            })
            .collect(),
        Err(err) => {
            warn!("Dropping a broker message: {}", err);
            vec![]
        }
    }
}

/// Drive the MQTT connection: (re)subscribe on every connection and forward
/// the received auctions. Connection errors are retried forever.
pub async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    topic: String,
    events: mpsc::Sender<InboundEvent>,
) {
    // `#` also matches the parent level, so publishers on the bare topic
    // are heard too
    let filter = format!("{}/#", topic.trim_end_matches('/'));
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(
                    "Connected to the MQTT broker, subscribing to {}",
                    filter
                );
                if let Err(err) =
                    client.subscribe(filter.clone(), QoS::AtLeastOnce).await
                {
                    warn!("Failed to subscribe to {}: {}", filter, err);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                trace!("Broker message on {}", publish.topic);
                for event in decode_message(&publish.payload) {
                    if events.send(event).await.is_err() {
                        debug!("Event dispatcher is gone, stopping MQTT");
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!("MQTT connection error: {}, reconnecting in 5s", err);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_published_message() {
        let events = decode_message(
            br#"{"version": 1, "data": {"auction": {
                "auctionId": "1",
                "auctionHouseUri": "http://a:8090",
                "jobType": "testJob",
                "status": "OPEN"
            }}}"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transport, InboundTransport::Broker);
        assert_eq!(events[0].payload.auction_uri(), "http://a:8090/auctions/1");
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_message(b"not json").is_empty());
        assert!(decode_message(br#"{"version": 2, "data": {"auction": {
            "auctionId": "1", "auctionHouseUri": "http://a/"}}}"#)
        .is_empty());
    }
}
