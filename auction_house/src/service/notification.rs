use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
use backoff::SystemClock;
use chrono::Utc;
use helper::link_header::find_rel;
use model::domain::subscription::Subscription;
use model::dto::event::{
    AuctionContent, AuctionMessage, AuctionPayload, InboundEvent,
    InboundTransport,
};
use model::view::websub::{HubMode, VerificationQuery};
use model::view::UnsupportedVersion;
use model::PeerUri;
use tokio::sync::mpsc;

use crate::repository::broker::MessageBroker;
use crate::repository::hub_client::HubClient;
use crate::repository::node_query::NodeQuery;
use crate::repository::recent_events::RecentEvents;
use crate::repository::subscription::SubscriptionStore;
use crate::repository::topology::TopologyStore;
use crate::service::auction::AuctionPublisher;
use crate::service::bidding::BiddingClient;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The pushed content is not a list of auctions: {0}")]
    UnreadableContent(#[from] serde_json::Error),
    #[error(transparent)]
    Version(#[from] UnsupportedVersion),
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// The hub this node publishes to, embedded or external.
    pub hub_uri:             String,
    pub retry_initial:       Duration,
    pub retry_max_elapsed:   Duration,
    /// A subscription still unconfirmed after this long is requested again.
    pub retry_pending_after: Duration,
    /// A confirmed subscription without a known lease is renewed after this
    /// long.
    pub renew_after:         Duration,
}

/// Announces the auctions of this node on the hub and the broker, and turns
/// whatever is heard from peers into events for the dispatcher.
#[derive(Debug)]
pub struct NotificationBridge {
    house:         PeerUri,
    settings:      BridgeSettings,
    hub_client:    Arc<dyn HubClient>,
    broker:        Option<Arc<dyn MessageBroker>>,
    node_query:    Arc<dyn NodeQuery>,
    topology:      Arc<TopologyStore>,
    subscriptions: Arc<SubscriptionStore>,
    events:        mpsc::Sender<InboundEvent>,
}

impl NotificationBridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        house: PeerUri,
        settings: BridgeSettings,
        hub_client: Arc<dyn HubClient>,
        broker: Option<Arc<dyn MessageBroker>>,
        node_query: Arc<dyn NodeQuery>,
        topology: Arc<TopologyStore>,
        subscriptions: Arc<SubscriptionStore>,
        events: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            house,
            settings,
            hub_client,
            broker,
            node_query,
            topology,
            subscriptions,
            events,
        }
    }

    pub fn hub_uri(&self) -> &str { &self.settings.hub_uri }

    /// The topic under which this node publishes its auctions.
    pub fn topic_uri(&self) -> String { self.house.join("auctions/") }

    pub fn callback_uri(&self) -> String { self.house.join("websub") }

    fn get_backoff(&self) -> ExponentialBackoff<SystemClock> {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(self.settings.retry_initial)
            .with_max_elapsed_time(Some(self.settings.retry_max_elapsed))
            .build()
    }

    /// Tell the hub the topic changed, retrying with an exponential backoff.
    #[instrument(level = "trace", skip(self))]
    pub async fn publish_to_hub(&self) {
        let hub = self.settings.hub_uri.clone();
        let topic = self.topic_uri();
        let res = backoff::future::retry(self.get_backoff(), || async {
            self.hub_client.publish(&hub, &topic).await.map_err(|err| {
                debug!("Hub {} refused the publication: {}", hub, err);
                backoff::Error::transient(err)
            })
        })
        .await;
        match res {
            Ok(()) => trace!("Published {} to {}", topic, hub),
            Err(err) => warn!("Hub {} is unavailable: {}", hub, err),
        }
    }

    #[instrument(level = "trace", skip(self, message))]
    pub async fn publish_to_broker(&self, message: AuctionMessage) {
        let Some(broker) = &self.broker else {
            return;
        };
        if let Err(err) = broker.publish(&message).await {
            warn!("MQTT broker is unavailable: {}", err);
        }
    }

    /// Hand the auctions to the dispatcher. Returns how many were queued.
    pub async fn enqueue(
        &self,
        payloads: Vec<AuctionPayload>,
        transport: InboundTransport,
    ) -> usize {
        let mut queued = 0;
        for payload in payloads {
            let event = InboundEvent { payload, transport };
            if self.events.send(event).await.is_err() {
                warn!("Event dispatcher is gone, dropping inbound auctions");
                break;
            }
            queued += 1;
        }
        queued
    }

    /// Content pushed by a hub on the callback of this node.
    #[instrument(level = "trace", skip(self, body))]
    pub async fn receive_push(&self, body: &[u8]) -> Result<usize, Error> {
        let content: AuctionContent = serde_json::from_slice(body)?;
        let payloads = content.into_payloads()?;
        Ok(self.enqueue(payloads, InboundTransport::Hub).await)
    }

    /// Answer the intent verification of a hub: the challenge is echoed only
    /// for a topic this node asked to subscribe to.
    #[instrument(level = "trace", skip(self))]
    pub fn verify_subscription(
        &self,
        query: &VerificationQuery,
    ) -> Option<String> {
        if query.mode != HubMode::Subscribe {
            debug!(
                "Refusing a {:?} verification for {}",
                query.mode, query.topic
            );
            return None;
        }
        if !self.subscriptions.confirm_topic(
            &query.topic,
            &query.challenge,
            query.lease_seconds,
        ) {
            debug!("No subscription pending for {}", query.topic);
            return None;
        }
        info!("Subscription to {} confirmed", query.topic);
        Some(query.challenge.clone())
    }

    fn needs_subscription(&self, topic: &str) -> bool {
        let Some(existing) = self.subscriptions.get(topic, &self.callback_uri())
        else {
            return true;
        };
        let elapsed = (Utc::now() - existing.requested_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if !existing.confirmed {
            return elapsed >= self.settings.retry_pending_after;
        }
        let renew_after = existing
            .lease_seconds
            .map(|lease| Duration::from_secs(lease / 2))
            .unwrap_or(self.settings.renew_after);
        elapsed >= renew_after
    }

    /// Subscribe to the hub of every ring peer not subscribed to yet. Returns
    /// the number of subscription requests accepted by hubs.
    #[instrument(level = "trace", skip(self))]
    pub async fn subscribe_to_peers(&self) -> usize {
        let callback = self.callback_uri();
        let mut requested = 0;
        for peer in self.topology.peers().await {
            let listing = match self.node_query.get_auctions(&peer).await {
                Ok(listing) => listing,
                Err(err) => {
                    warn!("Cannot read the auctions of {}: {}", peer, err);
                    continue;
                }
            };
            let Some(hub) = find_rel(&listing.links, "hub") else {
                debug!("{} does not advertise a hub", peer);
                continue;
            };
            let topic = find_rel(&listing.links, "self")
                .map(|link| link.uri.clone())
                .unwrap_or_else(|| peer.join("auctions/"));
            if !self.needs_subscription(&topic) {
                continue;
            }

            // Recorded first, the hub may verify before answering
            self.subscriptions.upsert_pending(Subscription::pending(
                topic.clone(),
                callback.clone(),
                None,
                None,
            ));
            match self.hub_client.subscribe(&hub.uri, &topic, &callback).await {
                Ok(()) => {
                    debug!("Asked {} for the topic {}", hub.uri, topic);
                    requested += 1;
                }
                Err(err) => {
                    warn!("Hub {} refused the subscription: {}", hub.uri, err);
                    let pending = self
                        .subscriptions
                        .get(&topic, &callback)
                        .is_some_and(|sub| !sub.confirmed);
                    if pending {
                        self.subscriptions.remove(&topic, &callback);
                    }
                }
            }
        }
        requested
    }

    /// Read the open auctions of every ring peer.
    #[instrument(level = "trace", skip(self))]
    pub async fn poll_peers(&self) -> usize {
        let mut queued = 0;
        for peer in self.topology.peers().await {
            match self.node_query.get_auctions(&peer).await {
                Ok(listing) => {
                    queued += self
                        .enqueue(listing.auctions, InboundTransport::Poll)
                        .await;
                }
                Err(err) => {
                    warn!("Cannot poll the auctions of {}: {}", peer, err)
                }
            }
        }
        queued
    }
}

/// Fans the opened auctions out, each transport on its own task.
#[derive(Debug, Clone)]
pub struct BridgePublisher {
    bridge: Arc<NotificationBridge>,
}

impl BridgePublisher {
    pub fn new(bridge: Arc<NotificationBridge>) -> Self { Self { bridge } }
}

#[async_trait]
impl AuctionPublisher for BridgePublisher {
    async fn auction_opened(&self, auction: AuctionPayload) {
        let bridge = self.bridge.clone();
        tokio::spawn(async move { bridge.publish_to_hub().await });
        let bridge = self.bridge.clone();
        let message = AuctionMessage::new(auction);
        tokio::spawn(async move { bridge.publish_to_broker(message).await });
    }
}

/// Single consumer of the inbound events: drops duplicates and the events
/// of this very node, hands the rest to the bidding client.
#[derive(Debug)]
pub struct Dispatcher {
    house:   PeerUri,
    recent:  RecentEvents,
    bidding: Arc<BiddingClient>,
}

impl Dispatcher {
    pub fn new(
        house: PeerUri,
        capacity: usize,
        bidding: Arc<BiddingClient>,
    ) -> Self {
        Self { house, recent: RecentEvents::new(capacity), bidding }
    }

    /// The payload to forward, if the event is new and not from this node.
    pub fn admit(&mut self, event: InboundEvent) -> Option<AuctionPayload> {
        if event.payload.auction_house_uri == self.house {
            trace!("Ignoring own auction {}", event.payload.auction_id);
            return None;
        }
        let key = event.payload.auction_uri();
        if !self.recent.insert(&key) {
            trace!("Duplicate auction {} via {:?}", key, event.transport);
            return None;
        }
        debug!("New auction {} via {:?}", key, event.transport);
        Some(event.payload)
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = events.recv().await {
            let Some(payload) = self.admit(event) else {
                continue;
            };
            let bidding = self.bidding.clone();
            tokio::spawn(async move {
                bidding.consider(payload).await;
            });
        }
        debug!("Inbound event channel closed, dispatcher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::assignment::AssignmentStore;
    use crate::repository::fakes::{
        uri, FakeBroker, FakeHubClient, FakeNodeQuery,
    };
    use crate::repository::node_query::AuctionListing;
    use crate::service::bidding::BiddingSettings;
    use helper::link_header::Link;
    use model::domain::peer::PeerNode;
    use model::RingType;
    use std::collections::HashSet;

    struct Fixture {
        bridge:        Arc<NotificationBridge>,
        hub_client:    Arc<FakeHubClient>,
        broker:        Arc<FakeBroker>,
        node_query:    Arc<FakeNodeQuery>,
        topology:      Arc<TopologyStore>,
        subscriptions: Arc<SubscriptionStore>,
        receiver:      mpsc::Receiver<InboundEvent>,
    }

    fn fixture() -> Fixture {
        let hub_client = Arc::new(FakeHubClient::default());
        let broker = Arc::new(FakeBroker::default());
        let node_query = Arc::new(FakeNodeQuery::default());
        let topology = Arc::new(TopologyStore::new(PeerNode::new(
            uri("http://me/"),
            RingType::Odd,
        )));
        let subscriptions = Arc::new(SubscriptionStore::new());
        let (sender, receiver) = mpsc::channel(16);
        let bridge = Arc::new(NotificationBridge::new(
            uri("http://me/"),
            BridgeSettings {
                hub_uri:             "http://me/hub".to_string(),
                retry_initial:       Duration::from_millis(1),
                retry_max_elapsed:   Duration::from_secs(1),
                retry_pending_after: Duration::from_secs(60),
                renew_after:         Duration::from_secs(3600),
            },
            hub_client.clone(),
            Some(broker.clone()),
            node_query.clone(),
            topology.clone(),
            subscriptions.clone(),
            sender,
        ));
        Fixture {
            bridge,
            hub_client,
            broker,
            node_query,
            topology,
            subscriptions,
            receiver,
        }
    }

    fn payload(house: &str, id: &str) -> AuctionPayload {
        AuctionPayload {
            auction_id:        id.to_string(),
            auction_uri:       None,
            auction_house_uri: uri(house),
            job_uri:           None,
            job_type:          "testJob".to_string(),
            deadline:          Some(Utc::now() + chrono::Duration::seconds(30)),
            status:            None,
        }
    }

    fn bidding(node_query: Arc<FakeNodeQuery>) -> Arc<BiddingClient> {
        Arc::new(BiddingClient::new(
            uri("http://me/"),
            BiddingSettings {
                supported_job_types: HashSet::new(),
                bidder_name:         "me".to_string(),
                bid_value:           1.0,
                retry_initial:       Duration::from_millis(1),
                retry_max_elapsed:   Duration::from_millis(10),
            },
            node_query,
            None,
            Arc::new(AssignmentStore::new()),
        ))
    }

    fn dispatcher(node_query: Arc<FakeNodeQuery>) -> Dispatcher {
        Dispatcher::new(uri("http://me/"), 8, bidding(node_query))
    }

    #[tokio::test]
    async fn test_publish_fans_out_on_both_transports() {
        let f = fixture();
        f.hub_client
            .publish_failures
            .store(2, std::sync::atomic::Ordering::SeqCst);
        let publisher = BridgePublisher::new(f.bridge.clone());
        publisher.auction_opened(payload("http://me/", "1")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            f.hub_client.publishes.lock().unwrap().clone(),
            vec![(
                "http://me/hub".to_string(),
                "http://me/auctions/".to_string()
            )]
        );
        let published = f.broker.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].version, Some(1));
        assert_eq!(published[0].data.auction.auction_id, "1");
    }

    #[test]
    fn test_same_auction_from_hub_and_broker_admitted_once() {
        let f = fixture();
        let mut dispatcher = dispatcher(f.node_query.clone());
        let event = |transport| InboundEvent {
            payload: payload("http://peer/", "7"),
            transport,
        };
        assert!(dispatcher.admit(event(InboundTransport::Hub)).is_some());
        assert!(dispatcher.admit(event(InboundTransport::Broker)).is_none());
        assert!(dispatcher.admit(event(InboundTransport::Poll)).is_none());
    }

    #[test]
    fn test_own_auctions_ignored() {
        let f = fixture();
        let mut dispatcher = dispatcher(f.node_query.clone());
        assert!(dispatcher
            .admit(InboundEvent {
                payload:   payload("http://me", "1"),
                transport: InboundTransport::Broker,
            })
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_bids_once() {
        let f = fixture();
        let Fixture { bridge, node_query, receiver, .. } = f;
        let dispatcher = dispatcher(node_query.clone());
        let handle = tokio::spawn(dispatcher.run(receiver));

        let push = serde_json::to_vec(&model::view::Envelope::new(
            serde_json::json!({"auctions": [payload("http://peer/", "9")]}),
        ))
        .unwrap();
        assert_eq!(bridge.receive_push(&push).await.unwrap(), 1);
        let again = vec![payload("http://peer/", "9")];
        bridge.enqueue(again, InboundTransport::Broker).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let bids = node_query.bids.lock().unwrap().clone();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].0, "http://peer/auctions/9");
        assert_eq!(bids[0].1.bidder_uri, "http://me/");
        handle.abort();
    }

    #[tokio::test]
    async fn test_unreadable_push_rejected() {
        let f = fixture();
        assert!(matches!(
            f.bridge.receive_push(b"<html/>").await,
            Err(Error::UnreadableContent(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_handshake() {
        let f = fixture();
        f.topology
            .insert(PeerNode::new(uri("http://peer/"), RingType::Odd))
            .await;
        f.node_query.listings.lock().unwrap().insert(
            uri("http://peer/"),
            AuctionListing {
                links:    vec![
                    Link::new("http://hub.example/", "hub"),
                    Link::new("http://peer/auctions/", "self"),
                ],
                auctions: vec![],
            },
        );

        assert_eq!(f.bridge.subscribe_to_peers().await, 1);
        assert_eq!(
            f.hub_client.subscribes.lock().unwrap().clone(),
            vec![(
                "http://hub.example/".to_string(),
                "http://peer/auctions/".to_string(),
                "http://me/websub".to_string()
            )]
        );
        // Pending, not asked twice
        assert_eq!(f.bridge.subscribe_to_peers().await, 0);

        let unknown = VerificationQuery {
            mode:          HubMode::Subscribe,
            topic:         "http://other/auctions/".to_string(),
            challenge:     "abc".to_string(),
            lease_seconds: None,
        };
        assert_eq!(f.bridge.verify_subscription(&unknown), None);

        let known = VerificationQuery {
            topic: "http://peer/auctions/".to_string(),
            ..unknown
        };
        let echoed = f.bridge.verify_subscription(&known);
        assert_eq!(echoed, Some("abc".to_string()));
        let confirmed = f.subscriptions.confirmed_for("http://peer/auctions/");
        assert_eq!(confirmed.len(), 1);

        let unsubscribe = VerificationQuery {
            mode: HubMode::Unsubscribe,
            ..known
        };
        assert_eq!(f.bridge.verify_subscription(&unsubscribe), None);
    }

    #[tokio::test]
    async fn test_poll_reads_every_peer() {
        let mut f = fixture();
        f.topology
            .insert(PeerNode::new(uri("http://peer/"), RingType::Odd))
            .await;
        f.topology
            .insert(PeerNode::new(uri("http://down/"), RingType::Odd))
            .await;
        f.node_query.unreachable.lock().unwrap().insert(uri("http://down/"));
        f.node_query.listings.lock().unwrap().insert(
            uri("http://peer/"),
            AuctionListing {
                links:    vec![],
                auctions: vec![
                    payload("http://peer/", "1"),
                    payload("http://peer/", "2"),
                ],
            },
        );

        assert_eq!(f.bridge.poll_peers().await, 2);
        let first = f.receiver.recv().await.unwrap();
        assert_eq!(first.transport, InboundTransport::Poll);
    }
}
