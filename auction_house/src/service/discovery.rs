use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use futures::future::join_all;
use helper::err::IndividualErrorList;
use model::domain::peer::PeerNode;
use model::view::discovery::{
    DiscoveryHost, DiscoveryHosts, DiscoveryRegistration,
};
use model::{PeerUri, RingType};

use crate::repository::node_query::NodeQuery;
use crate::repository::topology::TopologyStore;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("This node is on the {expected} ring, not on the {found} one")]
    TypeMismatch { expected: RingType, found: RingType },
}

/// Asked before a peer is crawled. A dead peer is skipped, never removed.
#[async_trait]
pub trait LivenessCheck: Debug + Sync + Send {
    async fn is_alive(&self, peer: &PeerUri) -> bool;
}

#[derive(Debug, Default)]
pub struct AssumeAlive;

#[async_trait]
impl LivenessCheck for AssumeAlive {
    async fn is_alive(&self, _peer: &PeerUri) -> bool { true }
}

/// `GET {peer}health` must answer 2xx.
#[derive(Debug)]
pub struct HttpProbe {
    node_query: Arc<dyn NodeQuery>,
}

impl HttpProbe {
    pub fn new(node_query: Arc<dyn NodeQuery>) -> Self { Self { node_query } }
}

#[async_trait]
impl LivenessCheck for HttpProbe {
    async fn is_alive(&self, peer: &PeerUri) -> bool {
        match self.node_query.health(peer).await {
            Ok(()) => true,
            Err(err) => {
                debug!("{} looks dead: {}", peer, err);
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub max_hops:      usize,
    pub crawl_timeout: Duration,
}

/// Keeps the ring of this node populated and registers this node with the
/// other members.
#[derive(Debug)]
pub struct DiscoveryMaintainer {
    topology:    Arc<TopologyStore>,
    node_query:  Arc<dyn NodeQuery>,
    liveness:    Arc<dyn LivenessCheck>,
    entry_point: Option<PeerUri>,
    settings:    DiscoverySettings,
    registered:  DashSet<PeerUri>,
}

impl DiscoveryMaintainer {
    pub fn new(
        topology: Arc<TopologyStore>,
        node_query: Arc<dyn NodeQuery>,
        liveness: Arc<dyn LivenessCheck>,
        entry_point: Option<PeerUri>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            topology,
            node_query,
            liveness,
            entry_point,
            settings,
            registered: DashSet::new(),
        }
    }

    fn me(&self) -> &PeerNode { self.topology.me() }

    pub fn ring_type(&self) -> RingType { self.me().ring_type }

    /// Crawl from the entry point, then register with everyone found. The
    /// entry point joins the ring only once it answers for the same ring.
    #[instrument(level = "trace", skip(self))]
    pub async fn bootstrap(&self) -> usize {
        let Some(entry_point) = self.entry_point.clone() else {
            info!("No entry point configured, running standalone");
            return 0;
        };
        if entry_point == self.me().uri {
            info!("This node is its own entry point");
            return 0;
        }
        let learned = self.crawl(vec![entry_point]).await;
        let registered = self.register_with_new_peers().await;
        info!(
            "Bootstrap done: {} nodes learned, registered with {}",
            learned, registered
        );
        learned
    }

    /// Re-crawl from every known peer and register with the new ones. An
    /// entry point that never answered is tried again.
    #[instrument(level = "trace", skip(self))]
    pub async fn refresh(&self) -> usize {
        let mut seeds = self.topology.peers().await;
        if let Some(entry_point) = &self.entry_point {
            if entry_point != &self.me().uri && !seeds.contains(entry_point) {
                seeds.push(entry_point.clone());
            }
        }
        if seeds.is_empty() {
            return 0;
        }
        let learned = self.crawl(seeds).await;
        self.register_with_new_peers().await;
        learned
    }

    /// Breadth first walk of the discovery answers, bounded by the hop and
    /// time budgets. Returns the number of nodes added to the store.
    #[instrument(level = "trace", skip(self))]
    pub async fn crawl(&self, seeds: Vec<PeerUri>) -> usize {
        let ring_type = self.me().ring_type;
        let before = self.topology.ring(ring_type).await.len();
        let crawl = self.crawl_hops(seeds);
        if tokio::time::timeout(self.settings.crawl_timeout, crawl)
            .await
            .is_err()
        {
            warn!(
                "Crawl stopped after {:?}, continuing with what was learned",
                self.settings.crawl_timeout
            );
        }
        self.topology.ring(ring_type).await.len().saturating_sub(before)
    }

    async fn crawl_hops(&self, seeds: Vec<PeerUri>) {
        let ring_type = self.me().ring_type;
        let mut visited = HashSet::from([self.me().uri.clone()]);
        let mut frontier: Vec<PeerUri> = seeds
            .into_iter()
            .filter(|seed| visited.insert(seed.clone()))
            .collect();

        for hop in 0..self.settings.max_hops {
            if frontier.is_empty() {
                return;
            }
            trace!("Crawl hop {} over {} peers", hop, frontier.len());
            let answers =
                join_all(frontier.iter().map(|peer| self.ring_hosts(peer)))
                    .await;

            let mut next = Vec::new();
            for uri in answers.into_iter().flatten().flatten() {
                let node = PeerNode::new(uri.clone(), ring_type);
                if self.topology.insert(node).await {
                    info!("Learned the {} node {}", ring_type, uri);
                }
                if visited.insert(uri.clone()) {
                    next.push(uri);
                }
            }
            frontier = next;
        }
        if !frontier.is_empty() {
            debug!(
                "Hop budget of {} exhausted, {} peers left unvisited",
                self.settings.max_hops,
                frontier.len()
            );
        }
    }

    /// The same-ring hosts a peer knows, itself included.
    async fn ring_hosts(&self, peer: &PeerUri) -> Option<Vec<PeerUri>> {
        if !self.liveness.is_alive(peer).await {
            return None;
        }
        let answer = match self.node_query.get_discovery(peer).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!("Discovery of {} failed: {}", peer, err);
                return None;
            }
        };
        if answer.ring_type != self.me().ring_type {
            warn!(
                "{} is on the {} ring, ignoring its hosts",
                peer, answer.ring_type
            );
            return None;
        }

        let mut hosts = vec![peer.clone()];
        for host in answer.hosts {
            match PeerUri::try_new(host.auction_house_uri.clone()) {
                Ok(uri) => hosts.push(uri),
                Err(err) => debug!(
                    "{} advertised an invalid host {:?}: {}",
                    peer, host.auction_house_uri, err
                ),
            }
        }
        Some(hosts)
    }

    /// Register this node with every known peer not registered with yet.
    /// Returns the number of successful registrations.
    #[instrument(level = "trace", skip(self))]
    pub async fn register_with_new_peers(&self) -> usize {
        let registration = DiscoveryRegistration {
            ring_type:         self.me().ring_type,
            auction_house_uri: self.me().uri.clone(),
        };
        let pending: Vec<PeerUri> = self
            .topology
            .peers()
            .await
            .into_iter()
            .filter(|peer| !self.registered.contains(peer))
            .collect();

        let results = join_all(
            pending
                .iter()
                .map(|peer| {
                    self.node_query.post_discovery(peer, &registration)
                }),
        )
        .await;
        let mut registered = 0;
        let mut failures = IndividualErrorList::default();
        for (peer, res) in pending.into_iter().zip(results) {
            match res {
                Ok(()) => {
                    debug!("Registered with {}", peer);
                    self.registered.insert(peer);
                    registered += 1;
                }
                Err(err) => failures.push(
                    anyhow::Error::new(err)
                        .context(format!("Registration with {} failed", peer)),
                ),
            }
        }
        if !failures.is_empty() {
            warn!("{} registrations failed: {}", failures.len(), failures);
        }
        registered
    }

    /// Every known node of this ring, self included.
    pub async fn handle_get(&self) -> DiscoveryHosts {
        let ring_type = self.me().ring_type;
        DiscoveryHosts {
            ring_type,
            hosts: self
                .topology
                .ring(ring_type)
                .await
                .into_iter()
                .map(|uri| DiscoveryHost { auction_house_uri: uri.to_string() })
                .collect(),
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn handle_post(
        &self,
        registration: DiscoveryRegistration,
    ) -> Result<DiscoveryRegistration, Error> {
        let expected = self.me().ring_type;
        if registration.ring_type != expected {
            return Err(Error::TypeMismatch {
                expected,
                found: registration.ring_type,
            });
        }
        if self
            .topology
            .insert(PeerNode::new(
                registration.auction_house_uri.clone(),
                registration.ring_type,
            ))
            .await
        {
            info!("{} registered", registration.auction_house_uri);
        }
        Ok(registration)
    }

    pub async fn ring_successor(&self) -> Option<PeerUri> {
        self.topology.successor().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fakes::{uri, FakeNodeQuery};

    fn maintainer(
        node_query: Arc<FakeNodeQuery>,
        entry_point: Option<&str>,
        max_hops: usize,
    ) -> (DiscoveryMaintainer, Arc<TopologyStore>) {
        let topology = Arc::new(TopologyStore::new(PeerNode::new(
            uri("http://me/"),
            RingType::Odd,
        )));
        let maintainer = DiscoveryMaintainer::new(
            topology.clone(),
            node_query,
            Arc::new(AssumeAlive),
            entry_point.map(uri),
            DiscoverySettings {
                max_hops,
                crawl_timeout: Duration::from_secs(5),
            },
        );
        (maintainer, topology)
    }

    fn chain() -> Arc<FakeNodeQuery> {
        let node_query = Arc::new(FakeNodeQuery::default());
        let odd = RingType::Odd;
        node_query.knows("http://a/", odd, &["http://a/", "http://b/"]);
        node_query.knows("http://b/", odd, &["http://b/", "http://c/"]);
        node_query.knows("http://c/", odd, &["http://c/", "http://me/"]);
        node_query
    }

    #[tokio::test]
    async fn test_crawl_follows_the_chain() {
        let node_query = chain();
        let (maintainer, topology) =
            maintainer(node_query.clone(), Some("http://a/"), 8);

        maintainer.bootstrap().await;

        assert_eq!(
            topology.ring(RingType::Odd).await,
            vec![
                uri("http://a/"),
                uri("http://b/"),
                uri("http://c/"),
                uri("http://me/")
            ]
        );
        let registrations = node_query.registrations.lock().unwrap().clone();
        assert_eq!(registrations.len(), 3);
        assert!(registrations.iter().all(|(_, reg)| reg.auction_house_uri
            == uri("http://me/")
            && reg.ring_type == RingType::Odd));

        // Already registered with everyone
        assert_eq!(maintainer.register_with_new_peers().await, 0);
    }

    #[tokio::test]
    async fn test_crawl_stops_at_hop_budget() {
        let (maintainer, topology) = maintainer(chain(), Some("http://a/"), 1);
        maintainer.bootstrap().await;
        assert_eq!(
            topology.ring(RingType::Odd).await,
            vec![uri("http://a/"), uri("http://b/"), uri("http://me/")]
        );
    }

    #[tokio::test]
    async fn test_other_ring_and_dead_peers_ignored() {
        let node_query = Arc::new(FakeNodeQuery::default());
        let hosts = ["http://b/", "http://down/"];
        node_query.knows("http://a/", RingType::Odd, &hosts);
        node_query.knows("http://b/", RingType::Even, &["http://x/"]);
        node_query.unreachable.lock().unwrap().insert(uri("http://down/"));
        let (maintainer, topology) =
            maintainer(node_query, Some("http://a/"), 8);

        maintainer.bootstrap().await;

        assert!(!topology.contains(&uri("http://x/")).await);
        assert_eq!(topology.ring(RingType::Even).await, vec![]);
        // Learned from a, kept even if it cannot be reached
        assert!(topology.contains(&uri("http://down/")).await);
    }

    #[tokio::test]
    async fn test_entry_point_of_the_other_ring_is_not_kept() {
        let node_query = Arc::new(FakeNodeQuery::default());
        node_query.knows("http://e/", RingType::Even, &["http://e/"]);
        let (maintainer, topology) =
            maintainer(node_query.clone(), Some("http://e/"), 8);

        assert_eq!(maintainer.bootstrap().await, 0);

        assert_eq!(topology.ring(RingType::Odd).await, vec![uri("http://me/")]);
        assert!(topology.ring(RingType::Even).await.is_empty());
        assert_eq!(maintainer.ring_successor().await, None);
        assert!(node_query.registrations.lock().unwrap().is_empty());
        let hosts = maintainer.handle_get().await;
        assert_eq!(hosts.hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_entry_point_retried_on_refresh() {
        let node_query = chain();
        node_query.unreachable.lock().unwrap().insert(uri("http://a/"));
        let (maintainer, topology) =
            maintainer(node_query.clone(), Some("http://a/"), 8);

        maintainer.bootstrap().await;
        assert_eq!(topology.ring(RingType::Odd).await, vec![uri("http://me/")]);

        node_query.unreachable.lock().unwrap().clear();
        assert_eq!(maintainer.refresh().await, 3);
        assert_eq!(node_query.registrations.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_learns_late_nodes() {
        let node_query = Arc::new(FakeNodeQuery::default());
        let odd = RingType::Odd;
        node_query.knows("http://a/", odd, &["http://a/", "http://b/"]);
        node_query.knows("http://b/", odd, &["http://b/"]);
        let (maintainer, topology) =
            maintainer(node_query.clone(), Some("http://a/"), 8);
        maintainer.bootstrap().await;
        assert_eq!(node_query.registrations.lock().unwrap().len(), 2);

        // b meets d after the bootstrap
        node_query.knows("http://b/", odd, &["http://b/", "http://d/"]);
        node_query.knows("http://d/", odd, &["http://d/"]);

        assert_eq!(maintainer.refresh().await, 1);
        assert!(topology.contains(&uri("http://d/")).await);
        assert_eq!(maintainer.refresh().await, 0);

        let registrations = node_query.registrations.lock().unwrap().clone();
        let with_d = registrations
            .iter()
            .filter(|(peer, _)| peer == &uri("http://d/"))
            .count();
        assert_eq!(with_d, 1);
        assert_eq!(registrations.len(), 3);
    }

    #[tokio::test]
    async fn test_standalone_without_entry_point() {
        let node_query = Arc::new(FakeNodeQuery::default());
        let (maintainer, topology) = maintainer(node_query.clone(), None, 8);
        assert_eq!(maintainer.bootstrap().await, 0);
        assert_eq!(topology.ring(RingType::Odd).await, vec![uri("http://me/")]);
        assert!(node_query.discovery_gets.lock().unwrap().is_empty());
        assert_eq!(maintainer.ring_successor().await, None);
    }

    #[tokio::test]
    async fn test_registration_rules() {
        let (maintainer, topology) =
            maintainer(Arc::new(FakeNodeQuery::default()), None, 8);
        let registration = |ring_type| DiscoveryRegistration {
            ring_type,
            auction_house_uri: uri("http://peer/"),
        };

        assert_eq!(
            maintainer.handle_post(registration(RingType::Even)).await,
            Err(Error::TypeMismatch {
                expected: RingType::Odd,
                found:    RingType::Even,
            })
        );
        assert_eq!(topology.ring(RingType::Odd).await.len(), 1);

        for _ in 0..2 {
            let res = maintainer.handle_post(registration(RingType::Odd)).await;
            assert!(res.is_ok());
        }
        let hosts = maintainer.handle_get().await;
        assert_eq!(hosts.ring_type, RingType::Odd);
        assert_eq!(
            hosts.hosts,
            vec![
                DiscoveryHost { auction_house_uri: "http://me/".to_string() },
                DiscoveryHost { auction_house_uri: "http://peer/".to_string() },
            ]
        );
        assert_eq!(
            maintainer.ring_successor().await,
            Some(uri("http://peer/"))
        );
    }

    #[tokio::test]
    async fn test_health_check_skips_dead_peers() {
        let node_query = Arc::new(FakeNodeQuery::default());
        node_query.unreachable.lock().unwrap().insert(uri("http://down/"));
        let check = HttpProbe::new(node_query.clone());
        assert!(check.is_alive(&uri("http://up/")).await);
        assert!(!check.is_alive(&uri("http://down/")).await);
    }
}
