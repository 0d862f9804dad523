use serde::{Deserialize, Serialize};

use crate::{PeerUri, RingType};

/// Body of `GET /discovery`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryHosts {
    #[serde(rename = "type")]
    pub ring_type: RingType,
    #[serde(default)]
    pub hosts:     Vec<DiscoveryHost>,
}

/// Kept as a plain string so one malformed host from a peer does not spoil
/// the whole answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryHost {
    pub auction_house_uri: String,
}

/// Body of `POST /discovery`, also echoed back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRegistration {
    #[serde(rename = "type")]
    pub ring_type:         RingType,
    pub auction_house_uri: PeerUri,
}
