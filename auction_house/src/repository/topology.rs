use std::collections::{BTreeSet, HashMap};

use model::domain::peer::PeerNode;
use model::{PeerUri, RingType};
use tokio::sync::RwLock;

/// Known auction houses, per ring. This node is always part of its own
/// ring and entries are never removed.
#[derive(Debug)]
pub struct TopologyStore {
    me:       PeerNode,
    database: RwLock<HashMap<RingType, BTreeSet<PeerUri>>>,
}

impl TopologyStore {
    pub fn new(me: PeerNode) -> Self {
        let mut database = HashMap::new();
        database.insert(me.ring_type, BTreeSet::from([me.uri.clone()]));
        Self { me, database: RwLock::new(database) }
    }

    pub fn me(&self) -> &PeerNode { &self.me }

    /// Returns whether the node was not known before.
    pub async fn insert(&self, node: PeerNode) -> bool {
        self.database
            .write()
            .await
            .entry(node.ring_type)
            .or_default()
            .insert(node.uri)
    }

    /// Every known node of the ring, self included, sorted.
    pub async fn ring(&self, ring_type: RingType) -> Vec<PeerUri> {
        self.database
            .read()
            .await
            .get(&ring_type)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The nodes of this node's ring, self excluded.
    pub async fn peers(&self) -> Vec<PeerUri> {
        self.ring(self.me.ring_type)
            .await
            .into_iter()
            .filter(|uri| uri != &self.me.uri)
            .collect()
    }

    #[cfg(test)]
    pub async fn contains(&self, uri: &PeerUri) -> bool {
        self.database
            .read()
            .await
            .get(&self.me.ring_type)
            .map(|set| set.contains(uri))
            .unwrap_or(false)
    }

    /// Next node after this one in the sorted ring, wrapping around. `None`
    /// while this node is alone.
    pub async fn successor(&self) -> Option<PeerUri> {
        let database = self.database.read().await;
        let ring = database.get(&self.me.ring_type)?;
        let next = ring
            .range((
                std::ops::Bound::Excluded(&self.me.uri),
                std::ops::Bound::Unbounded,
            ))
            .next()
            .or_else(|| ring.iter().next())?;
        if next == &self.me.uri {
            return None;
        }
        Some(next.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn uri(raw: &str) -> PeerUri { PeerUri::try_new(raw.to_string()).unwrap() }

    fn store(me: &str) -> TopologyStore {
        TopologyStore::new(PeerNode::new(uri(me), RingType::Odd))
    }

    #[tokio::test]
    async fn test_self_is_seeded_once() {
        let store = store("http://b/");
        let me = PeerNode::new(uri("http://b"), RingType::Odd);
        assert!(!store.insert(me).await);
        assert_eq!(store.ring(RingType::Odd).await, vec![uri("http://b/")]);
        assert!(store.peers().await.is_empty());
        assert!(store.ring(RingType::Even).await.is_empty());
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = store("http://b/");
        let a = PeerNode::new(uri("http://a/"), RingType::Odd);
        assert!(store.insert(a).await);
        let a_again = PeerNode::new(uri("http://a"), RingType::Odd);
        assert!(!store.insert(a_again).await);
        assert_eq!(store.peers().await, vec![uri("http://a/")]);
        assert!(store.contains(&uri("http://a/")).await);
    }

    #[parameterized(
        alone = {"http://b/", &[], None},
        next = {"http://b/", &["http://a/", "http://c/"], Some("http://c/")},
        wraps = {"http://c/", &["http://a/", "http://b/"], Some("http://a/")},
        single_peer = {"http://a/", &["http://b/"], Some("http://b/")},
    )]
    #[test_macro(tokio::test)]
    async fn test_successor(me: &str, others: &[&str], expected: Option<&str>) {
        let store = store(me);
        for other in others {
            store.insert(PeerNode::new(uri(other), RingType::Odd)).await;
        }
        assert_eq!(store.successor().await, expected.map(uri));
    }
}
