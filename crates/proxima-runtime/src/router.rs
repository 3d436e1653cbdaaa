//! Distance event router
//!
//! Turns one admitted, smoothed sighting into a `DistanceEvent`, applies
//! it to the local aggregator and publishes it on the cluster channel.
//! Events arriving from the cluster go through the same local application,
//! except the ones this node originated itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use proxima_beacon::{estimate_distance, Admission, Classifier, IdentityPolicy, SignalSmoother};
use proxima_core::{
    Beacon, BeaconId, BeaconSighting, DistanceEvent, NodeName, ProximaConfig, ProximaResult,
    Timestamp,
};
use proxima_presence::{ApplyOutcome, PresenceAggregator, PresenceChange};
use proxima_transport::ClusterTransport;

use crate::{Customizations, Entity, EntityKind, EntityRegistry, EntityState};

/// Entity id for this node's distance to a beacon
pub fn distance_entity_id(id: &BeaconId) -> String {
    format!("ble-{}-distance", id.slug())
}

/// Entity id for a beacon's closest node
pub fn presence_entity_id(id: &BeaconId) -> String {
    format!("ble-{}", id.slug())
}

#[derive(Clone, Debug, Default)]
pub struct RouterStats {
    pub sightings_seen: u64,
    pub sightings_admitted: u64,
    pub sightings_rejected: u64,
    pub sightings_throttled: u64,
    pub sightings_out_of_range: u64,
    pub events_published: u64,
    pub publish_failures: u64,
    pub events_received: u64,
    pub echoes_ignored: u64,
    pub events_stale: u64,
    pub sweeps: u64,
    pub filters_evicted: u64,
}

/// Distance Event Router - the per-node pipeline
pub struct Router {
    node: NodeName,
    channel: String,
    classifier: Classifier,
    policy: IdentityPolicy,
    smoother: SignalSmoother,
    aggregator: PresenceAggregator,
    path_loss_exponent: f64,
    max_distance: Option<f64>,
    update_frequency: Duration,
    filter_idle: Duration,
    /// Time of the last event built per identity (throttle)
    last_emitted: HashMap<BeaconId, Timestamp>,
    /// Last sequence number handed out
    sequence: u64,
    registry: Arc<dyn EntityRegistry>,
    transport: Arc<dyn ClusterTransport>,
    stats: RouterStats,
}

impl Router {
    /// Build the pipeline. The configuration is validated first.
    pub fn new(
        config: &ProximaConfig,
        registry: Arc<dyn EntityRegistry>,
        transport: Arc<dyn ClusterTransport>,
    ) -> ProximaResult<Self> {
        config.validate()?;
        Ok(Router {
            node: config.node_name.clone(),
            channel: config.channel.clone(),
            classifier: Classifier::from_config(config),
            policy: IdentityPolicy::from_config(config)?,
            smoother: SignalSmoother::from_config(config),
            aggregator: PresenceAggregator::from_config(config),
            path_loss_exponent: config.path_loss_exponent,
            max_distance: config.max_distance,
            update_frequency: config.update_frequency(),
            filter_idle: config.filter_idle(),
            last_emitted: HashMap::new(),
            sequence: sequence_base(),
            registry,
            transport,
            stats: RouterStats::default(),
        })
    }

    /// Start numbering events after `base`
    pub fn with_sequence_base(mut self, base: u64) -> Self {
        self.sequence = base;
        self
    }

    pub fn node_name(&self) -> &NodeName {
        &self.node
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn transport(&self) -> &Arc<dyn ClusterTransport> {
        &self.transport
    }

    /// Run one sighting through the pipeline. Returns the event when one
    /// was built; rejected, throttled and out-of-range sightings yield
    /// `None` without side effects.
    pub fn handle_sighting(
        &mut self,
        sighting: &BeaconSighting,
        now: Timestamp,
    ) -> Option<DistanceEvent> {
        self.stats.sightings_seen += 1;

        let beacon = match self.policy.admit(self.classifier.classify(sighting)) {
            Admission::Admitted(beacon) => beacon,
            Admission::Rejected(reason) => {
                self.stats.sightings_rejected += 1;
                tracing::trace!(sighting = %sighting.id, ?reason, "sighting rejected");
                return None;
            }
        };
        self.stats.sightings_admitted += 1;

        if self.is_throttled(&beacon.id, now) {
            self.stats.sightings_throttled += 1;
            return None;
        }

        let smoothed = self.smoother.smooth(&beacon.id, sighting.rssi as f64, now);
        let distance = estimate_distance(smoothed, beacon.calibration, self.path_loss_exponent);
        if let Some(max) = self.max_distance {
            if distance > max {
                self.stats.sightings_out_of_range += 1;
                tracing::trace!(beacon = %beacon.id, distance, max, "beacon out of range");
                return None;
            }
        }

        self.sequence += 1;
        let event = DistanceEvent::new(
            self.node.clone(),
            beacon.id.clone(),
            beacon.name.clone(),
            distance,
        )
        .with_sequence(self.sequence);
        self.last_emitted.insert(beacon.id.clone(), now);

        tracing::trace!(
            beacon = %beacon.id,
            rssi = sighting.rssi,
            smoothed,
            distance,
            "distance computed"
        );

        self.update_distance_entity(&beacon, distance);
        self.apply(&event, now);

        match self.transport.publish(&self.channel, &event) {
            Ok(()) => self.stats.events_published += 1,
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::warn!(
                    beacon = %event.beacon_identity,
                    error = %e,
                    "distance event publish failed"
                );
            }
        }

        Some(event)
    }

    /// Apply an event received from the cluster. Returns false for this
    /// node's own publications and for events rejected as out of order.
    pub fn handle_remote(&mut self, event: &DistanceEvent, now: Timestamp) -> bool {
        self.stats.events_received += 1;

        if event.originating_node == self.node {
            self.stats.echoes_ignored += 1;
            tracing::trace!(beacon = %event.beacon_identity, "own distance event echoed back");
            return false;
        }

        self.apply(event, now) != ApplyOutcome::Stale
    }

    /// Evict expired readings and idle filters, pushing presence changes
    /// to the registry
    pub fn sweep(&mut self, now: Timestamp) -> Vec<PresenceChange> {
        self.stats.sweeps += 1;

        let changes = self.aggregator.sweep(now);
        for change in &changes {
            match change {
                PresenceChange::Closest { id, closest } => {
                    let state = EntityState::Room(closest.node.clone());
                    self.registry.update_state(&presence_entity_id(id), state);
                }
                PresenceChange::Away { id } => {
                    self.registry.update_state(&presence_entity_id(id), EntityState::Away);
                }
            }
        }

        let evicted = self.smoother.evict_idle(now, self.filter_idle);
        self.stats.filters_evicted += evicted as u64;

        let window = self.update_frequency;
        self.last_emitted.retain(|_, at| now.since(*at) < window);

        changes
    }

    pub fn aggregator(&self) -> &PresenceAggregator {
        &self.aggregator
    }

    pub fn smoother(&self) -> &SignalSmoother {
        &self.smoother
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    fn is_throttled(&self, id: &BeaconId, now: Timestamp) -> bool {
        if self.update_frequency.is_zero() {
            return false;
        }
        self.last_emitted
            .get(id)
            .map_or(false, |at| now.since(*at) < self.update_frequency)
    }

    /// Local application: aggregator plus presence entity
    fn apply(&mut self, event: &DistanceEvent, now: Timestamp) -> ApplyOutcome {
        let outcome = self.aggregator.apply(event, now);
        let presence_id = presence_entity_id(&event.beacon_identity);

        match &outcome {
            ApplyOutcome::Entered(closest) => {
                if !self.registry.has(&presence_id) {
                    self.registry.add(
                        Entity::new(
                            presence_id.clone(),
                            format!("{} Room Presence", event.beacon_name),
                            EntityKind::Presence,
                        ),
                        Customizations::icon("mdi:account-location"),
                    );
                }
                self.registry
                    .update_state(&presence_id, EntityState::Room(closest.node.clone()));
            }
            ApplyOutcome::Updated { closest, changed } => {
                if *changed {
                    self.registry
                        .update_state(&presence_id, EntityState::Room(closest.node.clone()));
                }
            }
            ApplyOutcome::Stale => self.stats.events_stale += 1,
        }

        outcome
    }

    fn update_distance_entity(&self, beacon: &Beacon, distance: f64) {
        let id = distance_entity_id(&beacon.id);
        if !self.registry.has(&id) {
            self.registry.add(
                Entity::new(
                    id.clone(),
                    format!("{} Distance {}", beacon.name, self.node),
                    EntityKind::Distance,
                ),
                Customizations::icon("mdi:bluetooth").with_unit("m"),
            );
        }
        self.registry.update_state(&id, EntityState::Distance(distance));
    }
}

/// Sequence numbers continue across restarts by starting from wall-clock
/// microseconds, so peers holding an older reading accept the new ones.
fn sequence_base() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
