//! Distance events
//!
//! A `DistanceEvent` is the cluster-wide fact "node X currently measures
//! beacon Y at distance D". It is built once per accepted local sighting
//! or decoded once per received cluster message and never mutated.

use serde::{Deserialize, Serialize};

use crate::{BeaconId, NodeName, ProximaResult};

/// Distance fact published on the cluster channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceEvent {
    pub originating_node: NodeName,
    pub beacon_identity: BeaconId,
    pub beacon_name: String,
    /// Estimated distance in metres
    pub distance: f64,
    /// Per-originating-node counter, strictly increasing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl DistanceEvent {
    pub fn new(
        originating_node: NodeName,
        beacon_identity: BeaconId,
        beacon_name: impl Into<String>,
        distance: f64,
    ) -> Self {
        DistanceEvent {
            originating_node,
            beacon_identity,
            beacon_name: beacon_name.into(),
            distance,
            sequence: None,
        }
    }

    /// Set the originating node's sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Encode as the JSON payload carried on the wire
    pub fn to_json(&self) -> ProximaResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from a JSON payload
    pub fn from_json(buf: &[u8]) -> ProximaResult<Self> {
        Ok(serde_json::from_slice(buf)?)
    }
}
