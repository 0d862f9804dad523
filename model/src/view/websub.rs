use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
    Publish,
}

/// Form body of `POST /hub`. Every field is optional here, the hub decides
/// what is missing for the given mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubRequest {
    #[serde(rename = "hub.mode", default)]
    pub mode:          Option<String>,
    #[serde(rename = "hub.topic", default)]
    pub topic:         Option<String>,
    #[serde(rename = "hub.url", default)]
    pub url:           Option<String>,
    #[serde(rename = "hub.callback", default)]
    pub callback:      Option<String>,
    #[serde(rename = "hub.lease_seconds", default)]
    pub lease_seconds: Option<u64>,
}

/// Query of the intent verification a hub sends to a subscriber callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode:          HubMode,
    #[serde(rename = "hub.topic")]
    pub topic:         String,
    #[serde(rename = "hub.challenge")]
    pub challenge:     String,
    #[serde(
        rename = "hub.lease_seconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lease_seconds: Option<u64>,
}

impl HubMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "subscribe" => Some(HubMode::Subscribe),
            "unsubscribe" => Some(HubMode::Unsubscribe),
            "publish" => Some(HubMode::Publish),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        subscribe = {"subscribe", Some(HubMode::Subscribe)},
        unsubscribe = {"unsubscribe", Some(HubMode::Unsubscribe)},
        publish = {" publish", Some(HubMode::Publish)},
        unknown = {"denied", None},
    )]
    fn test_mode_parse(raw: &str, expected: Option<HubMode>) {
        assert_eq!(HubMode::parse(raw), expected);
    }
}
