//! Room presence state - one beacon's readings across the cluster

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use proxima_core::{BeaconId, DistanceEvent, NodeName, Timestamp};

/// Latest reading from one node
#[derive(Clone, Debug, PartialEq)]
pub struct NodeReading {
    pub distance: f64,
    /// Local arrival time
    pub updated_at: Timestamp,
    pub sequence: Option<u64>,
}

impl NodeReading {
    #[inline]
    pub fn is_stale(&self, now: Timestamp, timeout: Duration) -> bool {
        now.since(self.updated_at) > timeout
    }
}

/// Node currently judged closest to a beacon
#[derive(Clone, Debug, PartialEq)]
pub struct Closest {
    pub node: NodeName,
    pub distance: f64,
}

/// Result of storing one event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// Reading stored or refreshed
    Stored,
    /// Sequence older than the stored one from the same node
    Stale,
}

/// All live readings for one beacon identity
#[derive(Clone, Debug)]
pub struct RoomPresenceState {
    pub id: BeaconId,
    /// Last display name seen in an event
    pub name: String,
    readings: HashMap<NodeName, NodeReading>,
    /// Closest node as last reported outward
    current: Option<Closest>,
}

impl RoomPresenceState {
    pub fn new(id: BeaconId, name: impl Into<String>) -> Self {
        RoomPresenceState {
            id,
            name: name.into(),
            readings: HashMap::new(),
            current: None,
        }
    }

    /// Store the event's reading for its originating node
    ///
    /// Last write wins per node, except that an event carrying a sequence
    /// lower than the stored one is rejected. An equal sequence is a
    /// redelivery and only refreshes the arrival time.
    pub fn upsert(&mut self, event: &DistanceEvent, now: Timestamp) -> Upsert {
        if let Some(existing) = self.readings.get(&event.originating_node) {
            if let (Some(stored), Some(incoming)) = (existing.sequence, event.sequence) {
                if incoming < stored {
                    return Upsert::Stale;
                }
            }
        }

        self.name.clone_from(&event.beacon_name);
        self.readings.insert(
            event.originating_node.clone(),
            NodeReading {
                distance: event.distance,
                updated_at: now,
                sequence: event.sequence,
            },
        );
        Upsert::Stored
    }

    /// Remove readings older than `timeout`. Returns how many went.
    pub fn evict_stale(&mut self, now: Timestamp, timeout: Duration) -> usize {
        let before = self.readings.len();
        self.readings.retain(|_, r| !r.is_stale(now, timeout));
        before - self.readings.len()
    }

    /// Minimum distance over readings younger than `timeout`; ties go to
    /// the lexicographically smallest node name so every node agrees
    pub fn closest(&self, now: Timestamp, timeout: Duration) -> Option<Closest> {
        self.readings
            .iter()
            .filter(|(_, r)| !r.is_stale(now, timeout))
            .min_by(|(na, a), (nb, b)| match a.distance.total_cmp(&b.distance) {
                Ordering::Equal => na.cmp(nb),
                other => other,
            })
            .map(|(node, r)| Closest {
                node: node.clone(),
                distance: r.distance,
            })
    }

    /// Record the closest node; true when it differs from the previous one
    pub(crate) fn publish(&mut self, closest: Option<Closest>) -> bool {
        let changed = self.current != closest;
        self.current = closest;
        changed
    }

    pub fn current(&self) -> Option<&Closest> {
        self.current.as_ref()
    }

    pub fn reading(&self, node: &NodeName) -> Option<&NodeReading> {
        self.readings.get(node)
    }

    pub fn readings(&self) -> impl Iterator<Item = (&NodeName, &NodeReading)> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
