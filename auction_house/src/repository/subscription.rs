use dashmap::mapref::entry::Entry;
use model::domain::subscription::Subscription;

/// Topics are compared without their trailing slash.
fn topic_key(topic: &str) -> String {
    topic.trim().trim_end_matches('/').to_string()
}

fn key(topic: &str, callback: &str) -> (String, String) {
    (topic_key(topic), callback.trim().to_string())
}

/// WebSub subscriptions keyed by `(topic, callback)`.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    database: dashmap::DashMap<(String, String), Subscription>,
}

impl SubscriptionStore {
    pub fn new() -> Self { Self::default() }

    /// Record a new request. Renewing a confirmed subscription keeps it
    /// confirmed while the new challenge is pending.
    pub fn upsert_pending(&self, subscription: Subscription) {
        let key = key(&subscription.topic_uri, &subscription.callback_uri);
        match self.database.entry(key) {
            Entry::Occupied(mut existing) => {
                let mut subscription = subscription;
                subscription.confirmed = existing.get().confirmed;
                existing.insert(subscription);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(subscription);
            }
        }
    }

    /// Confirm with the body echoed by the subscriber. Returns whether it
    /// matched the pending challenge.
    pub fn confirm_with(
        &self,
        topic: &str,
        callback: &str,
        echoed: &str,
    ) -> bool {
        self.database
            .get_mut(&key(topic, callback))
            .map(|mut sub| sub.confirm_with(echoed))
            .unwrap_or(false)
    }

    /// Confirm every subscription to the topic, used on the subscriber side
    /// where the challenge is chosen by the hub.
    pub fn confirm_topic(
        &self,
        topic: &str,
        challenge: &str,
        lease_seconds: Option<u64>,
    ) -> bool {
        let topic = topic_key(topic);
        let mut found = false;
        for mut sub in self.database.iter_mut() {
            if sub.key().0 == topic {
                sub.challenge = Some(challenge.to_string());
                sub.lease_seconds = lease_seconds.or(sub.lease_seconds);
                sub.confirmed = true;
                found = true;
            }
        }
        found
    }

    pub fn remove(&self, topic: &str, callback: &str) -> Option<Subscription> {
        self.database.remove(&key(topic, callback)).map(|(_, sub)| sub)
    }

    pub fn get(&self, topic: &str, callback: &str) -> Option<Subscription> {
        self.database.get(&key(topic, callback)).map(|sub| sub.clone())
    }

    /// Subscriptions allowed to receive content for the topic.
    pub fn confirmed_for(&self, topic: &str) -> Vec<Subscription> {
        let topic = topic_key(topic);
        self.database
            .iter()
            .filter(|sub| sub.key().0 == topic && sub.confirmed)
            .map(|sub| sub.value().clone())
            .collect()
    }

    #[cfg(test)]
    pub fn all(&self) -> Vec<Subscription> {
        self.database.iter().map(|sub| sub.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(topic: &str, callback: &str, challenge: &str) -> Subscription {
        Subscription::pending(
            topic.to_string(),
            callback.to_string(),
            Some(challenge.to_string()),
            None,
        )
    }

    const TOPIC: &str = "http://a/auctions/";

    #[test]
    fn test_only_confirmed_receive_content() {
        let store = SubscriptionStore::new();
        store.upsert_pending(pending(TOPIC, "http://b/websub", "x"));
        store.upsert_pending(pending(TOPIC, "http://c/websub", "y"));
        assert!(store.confirmed_for("http://a/auctions").is_empty());

        assert!(!store.confirm_with(TOPIC, "http://b/websub", "y"));
        assert!(store.confirm_with(TOPIC, "http://b/websub", "x"));

        let confirmed = store.confirmed_for(TOPIC);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].callback_uri, "http://b/websub");
    }

    #[test]
    fn test_renewal_keeps_confirmation() {
        let store = SubscriptionStore::new();
        store.upsert_pending(pending(TOPIC, "http://b/websub", "x"));
        store.confirm_with(TOPIC, "http://b/websub", "x");
        store.upsert_pending(pending(TOPIC, "http://b/websub", "z"));

        let sub = store.get(TOPIC, "http://b/websub").unwrap();
        assert!(sub.confirmed);
        assert_eq!(sub.challenge.as_deref(), Some("z"));
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_confirm_topic_on_subscriber_side() {
        let store = SubscriptionStore::new();
        assert!(!store.confirm_topic("http://a/auctions/", "c", None));
        store.upsert_pending(Subscription::pending(
            "http://a/auctions/".to_string(),
            "http://me/websub".to_string(),
            None,
            None,
        ));
        assert!(store.confirm_topic("http://a/auctions/", "c", Some(600)));
        let confirmed = store.confirmed_for("http://a/auctions/");
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].lease_seconds, Some(600));
        assert!(store.remove(TOPIC, "http://me/websub").is_some());
        assert!(store.all().is_empty());
    }
}
