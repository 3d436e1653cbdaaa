//! Presence aggregator
//!
//! Per beacon identity: *unseen* (no entry) → *tracking* (at least one live
//! node reading) → *unseen* once every reading has expired. The cycle can
//! repeat indefinitely. Eviction is driven by one global `sweep` rather
//! than a timer per identity.

use std::collections::HashMap;
use std::time::Duration;

use proxima_core::{BeaconId, DistanceEvent, ProximaConfig, Timestamp};

use crate::{Closest, RoomPresenceState, Upsert};

/// Phase of one identity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresencePhase {
    Unseen,
    Tracking,
}

/// Result of applying one distance event
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    /// First reading for the identity: unseen → tracking
    Entered(Closest),
    /// Reading stored; `changed` when the closest node moved
    Updated { closest: Closest, changed: bool },
    /// Rejected by the sequence guard
    Stale,
}

/// Outward change found by a sweep
#[derive(Clone, Debug, PartialEq)]
pub enum PresenceChange {
    /// Closest node changed after an eviction
    Closest { id: BeaconId, closest: Closest },
    /// Last reading expired: tracking → unseen
    Away { id: BeaconId },
}

/// Aggregation counters
#[derive(Clone, Debug, Default)]
pub struct AggregatorStats {
    pub events_applied: u64,
    pub events_stale: u64,
    pub readings_evicted: u64,
    pub identities_entered: u64,
    pub identities_away: u64,
    pub sweeps: u64,
}

/// Reconciles every node's readings into one closest-node judgment per beacon
#[derive(Debug)]
pub struct PresenceAggregator {
    timeout: Duration,
    rooms: HashMap<BeaconId, RoomPresenceState>,
    stats: AggregatorStats,
}

impl PresenceAggregator {
    pub fn new(timeout: Duration) -> Self {
        PresenceAggregator {
            timeout,
            rooms: HashMap::new(),
            stats: AggregatorStats::default(),
        }
    }

    pub fn from_config(config: &ProximaConfig) -> Self {
        PresenceAggregator::new(config.presence_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Apply one event. Never fails: unknown nodes and odd distances are
    /// taken as they come.
    pub fn apply(&mut self, event: &DistanceEvent, now: Timestamp) -> ApplyOutcome {
        let entered = !self.rooms.contains_key(&event.beacon_identity);
        let room = self
            .rooms
            .entry(event.beacon_identity.clone())
            .or_insert_with(|| {
                RoomPresenceState::new(event.beacon_identity.clone(), event.beacon_name.clone())
            });

        if room.upsert(event, now) == Upsert::Stale {
            self.stats.events_stale += 1;
            tracing::debug!(
                beacon = %event.beacon_identity,
                node = %event.originating_node,
                sequence = ?event.sequence,
                "stale distance event ignored"
            );
            return ApplyOutcome::Stale;
        }
        self.stats.events_applied += 1;

        // The reading just stored is fresh, so a closest node always exists
        let closest = room.closest(now, self.timeout).unwrap_or_else(|| Closest {
            node: event.originating_node.clone(),
            distance: event.distance,
        });
        let changed = room.publish(Some(closest.clone()));

        if entered {
            self.stats.identities_entered += 1;
            tracing::info!(
                beacon = %event.beacon_identity,
                node = %closest.node,
                distance = closest.distance,
                "beacon entered tracking"
            );
            ApplyOutcome::Entered(closest)
        } else {
            if changed {
                tracing::debug!(
                    beacon = %event.beacon_identity,
                    node = %closest.node,
                    distance = closest.distance,
                    "closest node updated"
                );
            }
            ApplyOutcome::Updated { closest, changed }
        }
    }

    /// Evict expired readings across all identities
    pub fn sweep(&mut self, now: Timestamp) -> Vec<PresenceChange> {
        self.stats.sweeps += 1;
        let mut changes = Vec::new();
        let timeout = self.timeout;

        for room in self.rooms.values_mut() {
            let evicted = room.evict_stale(now, timeout);
            if evicted == 0 {
                continue;
            }
            self.stats.readings_evicted += evicted as u64;

            if room.is_empty() {
                changes.push(PresenceChange::Away {
                    id: room.id.clone(),
                });
                continue;
            }

            let closest = room.closest(now, timeout);
            if room.publish(closest.clone()) {
                if let Some(closest) = closest {
                    changes.push(PresenceChange::Closest {
                        id: room.id.clone(),
                        closest,
                    });
                }
            }
        }

        for change in &changes {
            if let PresenceChange::Away { id } = change {
                self.rooms.remove(id);
                self.stats.identities_away += 1;
                tracing::info!(beacon = %id, "beacon away, all readings expired");
            }
        }

        changes
    }

    pub fn phase(&self, id: &BeaconId) -> PresencePhase {
        if self.rooms.contains_key(id) {
            PresencePhase::Tracking
        } else {
            PresencePhase::Unseen
        }
    }

    /// Minimum distance over non-stale readings, `None` when away
    pub fn best_distance(&self, id: &BeaconId, now: Timestamp) -> Option<f64> {
        self.closest(id, now).map(|c| c.distance)
    }

    pub fn closest(&self, id: &BeaconId, now: Timestamp) -> Option<Closest> {
        self.rooms.get(id)?.closest(now, self.timeout)
    }

    pub fn room(&self, id: &BeaconId) -> Option<&RoomPresenceState> {
        self.rooms.get(id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &BeaconId> {
        self.rooms.keys()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_core::NodeName;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn event(node: &str, distance: f64) -> DistanceEvent {
        DistanceEvent::new(NodeName::new(node), BeaconId::new("tag"), "Tag", distance)
    }

    fn tag() -> BeaconId {
        BeaconId::new("tag")
    }

    #[test]
    fn test_first_event_enters_tracking() {
        let mut agg = PresenceAggregator::new(TIMEOUT);
        assert_eq!(agg.phase(&tag()), PresencePhase::Unseen);

        let outcome = agg.apply(&event("A", 2.0), Timestamp::ZERO);
        assert!(matches!(outcome, ApplyOutcome::Entered(ref c) if c.node == NodeName::new("A")));
        assert_eq!(agg.phase(&tag()), PresencePhase::Tracking);

        let outcome = agg.apply(&event("B", 5.0), Timestamp::ZERO);
        assert!(matches!(outcome, ApplyOutcome::Updated { changed: false, .. }));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut once = PresenceAggregator::new(TIMEOUT);
        once.apply(&event("A", 2.0), Timestamp::ZERO);

        let mut twice = PresenceAggregator::new(TIMEOUT);
        twice.apply(&event("A", 2.0), Timestamp::ZERO);
        twice.apply(&event("A", 2.0), Timestamp::from_secs(1));

        assert_eq!(
            once.best_distance(&tag(), Timestamp::from_secs(1)),
            twice.best_distance(&tag(), Timestamp::from_secs(1))
        );
        assert_eq!(twice.room(&tag()).unwrap().len(), 1);
    }

    #[test]
    fn test_eviction_cycle() {
        let mut agg = PresenceAggregator::new(TIMEOUT);
        agg.apply(&event("A", 2.0), Timestamp::ZERO);
        agg.apply(&event("B", 5.0), Timestamp::ZERO);
        assert_eq!(agg.best_distance(&tag(), Timestamp::ZERO), Some(2.0));

        assert!(agg.sweep(Timestamp::from_secs(30)).is_empty());

        let changes = agg.sweep(Timestamp::from_secs(61));
        assert_eq!(changes, vec![PresenceChange::Away { id: tag() }]);
        assert_eq!(agg.phase(&tag()), PresencePhase::Unseen);
        assert_eq!(agg.best_distance(&tag(), Timestamp::from_secs(61)), None);

        let outcome = agg.apply(&event("B", 4.5), Timestamp::from_secs(62));
        assert!(matches!(outcome, ApplyOutcome::Entered(_)));
        assert_eq!(agg.best_distance(&tag(), Timestamp::from_secs(62)), Some(4.5));
        assert_eq!(agg.stats().identities_away, 1);
        assert_eq!(agg.stats().identities_entered, 2);
    }

    #[test]
    fn test_sweep_reports_new_closest() {
        let mut agg = PresenceAggregator::new(TIMEOUT);
        agg.apply(&event("A", 1.0), Timestamp::ZERO);
        agg.apply(&event("B", 3.0), Timestamp::from_secs(40));

        let changes = agg.sweep(Timestamp::from_secs(61));
        assert_eq!(
            changes,
            vec![PresenceChange::Closest {
                id: tag(),
                closest: Closest {
                    node: NodeName::new("B"),
                    distance: 3.0
                }
            }]
        );
        assert_eq!(agg.stats().readings_evicted, 1);
    }

    #[test]
    fn test_closer_node_takes_over() {
        let mut agg = PresenceAggregator::new(TIMEOUT);
        agg.apply(&event("A", 4.0), Timestamp::ZERO);
        let outcome = agg.apply(&event("B", 1.0), Timestamp::from_secs(1));

        match outcome {
            ApplyOutcome::Updated { closest, changed } => {
                assert!(changed);
                assert_eq!(closest.node, NodeName::new("B"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_negative_distance_accepted() {
        let mut agg = PresenceAggregator::new(TIMEOUT);
        agg.apply(&event("ghost", -1.0), Timestamp::ZERO);
        assert_eq!(agg.best_distance(&tag(), Timestamp::ZERO), Some(-1.0));
    }

    #[test]
    fn test_out_of_order_same_node_rejected() {
        let mut agg = PresenceAggregator::new(TIMEOUT);
        agg.apply(&event("A", 1.0).with_sequence(10), Timestamp::ZERO);
        let outcome = agg.apply(&event("A", 8.0).with_sequence(9), Timestamp::from_secs(1));

        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(agg.best_distance(&tag(), Timestamp::from_secs(1)), Some(1.0));
        assert_eq!(agg.stats().events_stale, 1);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_best_distance_is_minimum_of_latest(
                readings in proptest::collection::vec((0usize..6, 0.1f64..30.0), 1..40),
            ) {
                let mut agg = PresenceAggregator::new(TIMEOUT);
                let mut latest = HashMap::new();
                for (node, distance) in &readings {
                    agg.apply(&event(&format!("n{}", node), *distance), Timestamp::ZERO);
                    latest.insert(*node, *distance);
                }

                let expected = latest.values().cloned().fold(f64::INFINITY, f64::min);
                prop_assert_eq!(agg.best_distance(&tag(), Timestamp::ZERO), Some(expected));
            }
        }
    }
}
