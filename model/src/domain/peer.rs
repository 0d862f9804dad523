use serde::{Deserialize, Serialize};

use crate::{PeerUri, RingType};

/// Another auction house known to this one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerNode {
    pub uri:       PeerUri,
    pub ring_type: RingType,
}

impl PeerNode {
    pub fn new(uri: PeerUri, ring_type: RingType) -> Self {
        Self { uri, ring_type }
    }
}
