use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A WebSub subscription, either one this node asked a hub for, or one a
/// subscriber asked the embedded hub for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub topic_uri:     String,
    pub callback_uri:  String,
    /// Only set once the challenge has been echoed back verbatim.
    pub confirmed:     bool,
    pub challenge:     Option<String>,
    pub lease_seconds: Option<u64>,
    pub requested_at:  DateTime<Utc>,
}

impl Subscription {
    pub fn pending(
        topic_uri: String,
        callback_uri: String,
        challenge: Option<String>,
        lease_seconds: Option<u64>,
    ) -> Self {
        Self {
            topic_uri,
            callback_uri,
            confirmed: false,
            challenge,
            lease_seconds,
            requested_at: Utc::now(),
        }
    }

    /// Confirm the subscription if `echoed` is exactly the challenge that
    /// was issued. A subscription without an issued challenge cannot be
    /// confirmed this way.
    pub fn confirm_with(&mut self, echoed: &str) -> bool {
        match &self.challenge {
            Some(challenge) if challenge == echoed => {
                self.confirmed = true;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_requires_exact_echo() {
        let mut sub = Subscription::pending(
            "http://a/auctions/".to_string(),
            "http://b/websub".to_string(),
            Some("c-123".to_string()),
            None,
        );
        assert!(!sub.confirm_with("c-123 "));
        assert!(!sub.confirm_with("C-123"));
        assert!(!sub.confirmed);
        assert!(sub.confirm_with("c-123"));
        assert!(sub.confirmed);
    }

    #[test]
    fn test_no_challenge_never_confirms() {
        let mut sub = Subscription::pending(
            "http://a/auctions/".to_string(),
            "http://b/websub".to_string(),
            None,
            None,
        );
        assert!(!sub.confirm_with(""));
        assert!(!sub.confirmed);
    }
}
