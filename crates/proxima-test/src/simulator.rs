//! Cluster simulator
//!
//! Drives several real routers in simulated time. Every publication is
//! encoded as a wire frame and pushed through a faulty link to each other
//! node (and back to the publisher when echo is on), decoded on arrival
//! and handed to the receiving router.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use proxima_core::{
    BeaconId, BeaconSighting, DistanceEvent, NodeName, ProximaConfig, ProximaResult, Timestamp,
};
use proxima_runtime::{
    presence_entity_id, EntityRegistry, EntityState, MemoryRegistry, Router,
};
use proxima_transport::{ClusterMessage, ClusterReceiver, ClusterSender, ClusterTransport};
use proxima_wire::Frame;

use crate::link::{FaultyLink, LinkProfile, LinkStats};

type Outbox = Arc<Mutex<Vec<(String, DistanceEvent)>>>;

/// Transport that parks publications until the simulator moves them
#[derive(Clone, Default)]
pub struct SimTransport {
    outbox: Outbox,
    subscribers: Arc<Mutex<Vec<(String, ClusterSender)>>>,
}

impl SimTransport {
    pub fn new() -> Self {
        SimTransport::default()
    }

    /// Take every publication made since the last drain
    pub fn drain(&self) -> Vec<(String, DistanceEvent)> {
        std::mem::take(&mut *self.outbox.lock())
    }
}

impl ClusterTransport for SimTransport {
    fn publish(&self, channel: &str, event: &DistanceEvent) -> ProximaResult<()> {
        self.outbox.lock().push((channel.to_string(), event.clone()));
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> ProximaResult<ClusterReceiver> {
        let (tx, rx) = mpsc::channel(proxima_transport::DEFAULT_SUBSCRIPTION_BUFFER);
        self.subscribers.lock().push((channel.to_string(), tx));
        Ok(rx)
    }
}

/// One simulated node
pub struct SimNode {
    pub name: NodeName,
    router: Router,
    registry: Arc<MemoryRegistry>,
    transport: SimTransport,
}

#[derive(Clone, Debug, Default)]
pub struct SimulatorStats {
    pub frames_sent: u64,
    pub frames_delivered: u64,
    pub frames_undecodable: u64,
    pub sweeps: u64,
}

/// Multi-node cluster in simulated time
pub struct ClusterSimulator {
    nodes: Vec<SimNode>,
    /// Directed links keyed by (from, to); ordered for reproducible runs
    links: BTreeMap<(usize, usize), FaultyLink>,
    profile: LinkProfile,
    seed: u64,
    echo: bool,
    sweep_interval: Duration,
    since_sweep: Duration,
    elapsed: Duration,
    stats: SimulatorStats,
}

impl ClusterSimulator {
    pub fn new(profile: LinkProfile, seed: u64) -> Self {
        ClusterSimulator {
            nodes: Vec::new(),
            links: BTreeMap::new(),
            profile,
            seed,
            echo: false,
            sweep_interval: Duration::from_secs(1),
            since_sweep: Duration::ZERO,
            elapsed: Duration::ZERO,
            stats: SimulatorStats::default(),
        }
    }

    pub fn perfect() -> Self {
        ClusterSimulator::new(LinkProfile::lossless(), 0)
    }

    /// Also deliver every publication back to its publisher
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Add a node running `config`. Returns its index.
    pub fn add_node(&mut self, config: ProximaConfig) -> ProximaResult<usize> {
        let registry = Arc::new(MemoryRegistry::new());
        let transport = SimTransport::new();
        let router = Router::new(&config, registry.clone(), Arc::new(transport.clone()))?
            .with_sequence_base(0);

        let index = self.nodes.len();
        self.nodes.push(SimNode {
            name: config.node_name.clone(),
            router,
            registry,
            transport,
        });

        for other in 0..=index {
            self.link(other, index);
            self.link(index, other);
        }
        Ok(index)
    }

    /// Add a node with default settings apart from its name
    pub fn add_named(&mut self, name: &str) -> ProximaResult<usize> {
        self.add_node(ProximaConfig {
            node_name: NodeName::new(name),
            ..ProximaConfig::default()
        })
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name.as_str() == name)
    }

    /// Simulated time since start
    pub fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.elapsed.as_micros() as i64)
    }

    /// Feed a sighting to one node and put its publication on the links
    pub fn sighting(&mut self, node: usize, sighting: &BeaconSighting) -> Option<DistanceEvent> {
        let now = self.now();
        let event = self.nodes.get_mut(node)?.router.handle_sighting(sighting, now);
        self.flush(node);
        event
    }

    /// Advance time, deliver due frames and run due sweeps
    pub fn tick(&mut self, dt: Duration) {
        self.elapsed += dt;
        let now = self.now();

        let mut arrivals = Vec::new();
        for (&(_, to), link) in self.links.iter_mut() {
            for data in link.tick(dt) {
                arrivals.push((to, data));
            }
        }

        for (to, data) in arrivals {
            let decoded = Frame::parse(&data).and_then(|frame| {
                let event = frame.event()?;
                Ok(ClusterMessage {
                    channel: frame.channel,
                    event,
                })
            });
            let message = match decoded {
                Ok(message) => message,
                Err(e) => {
                    self.stats.frames_undecodable += 1;
                    tracing::warn!(error = %e, "simulated frame undecodable");
                    continue;
                }
            };

            let node = &mut self.nodes[to];
            if message.channel == node.router.channel() {
                self.stats.frames_delivered += 1;
                node.router.handle_remote(&message.event, now);
            }
        }

        self.since_sweep += dt;
        while self.since_sweep >= self.sweep_interval {
            self.since_sweep -= self.sweep_interval;
            self.stats.sweeps += 1;
            for node in &mut self.nodes {
                node.router.sweep(now);
            }
        }
    }

    /// Tick in steps of `step` until `duration` has passed
    pub fn run_for(&mut self, duration: Duration, step: Duration) {
        let step = step.max(Duration::from_millis(1));
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            let dt = step.min(remaining);
            self.tick(dt);
            remaining -= dt;
        }
    }

    /// Tick until no frame is in flight, at most `limit` of simulated time
    pub fn settle(&mut self, limit: Duration) {
        let step = Duration::from_millis(10);
        let mut waited = Duration::ZERO;
        while self.in_flight() > 0 && waited < limit {
            self.tick(step);
            waited += step;
        }
    }

    /// Frames on all links
    pub fn in_flight(&self) -> usize {
        self.links.values().map(|l| l.in_flight()).sum()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn router(&self, node: usize) -> &Router {
        &self.nodes[node].router
    }

    pub fn registry(&self, node: usize) -> &MemoryRegistry {
        &self.nodes[node].registry
    }

    /// Presence entity state for `id` as seen by `node`
    pub fn presence(&self, node: usize, id: &BeaconId) -> Option<EntityState> {
        self.registry(node)
            .get(&presence_entity_id(id))
            .map(|e| e.state)
    }

    /// Closest node for `id` according to every node
    pub fn closest_everywhere(&self, id: &BeaconId) -> Vec<Option<NodeName>> {
        let now = self.now();
        self.nodes
            .iter()
            .map(|n| n.router.aggregator().closest(id, now).map(|c| c.node))
            .collect()
    }

    pub fn link_stats(&self, from: usize, to: usize) -> Option<&LinkStats> {
        self.links.get(&(from, to)).map(|l| l.stats())
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    fn link(&mut self, from: usize, to: usize) -> &mut FaultyLink {
        let seed = self.seed.wrapping_mul(1_000_003) ^ ((from as u64) << 32 | to as u64);
        let profile = &self.profile;
        self.links
            .entry((from, to))
            .or_insert_with(|| FaultyLink::new(profile.clone(), seed))
    }

    fn flush(&mut self, from: usize) {
        let published = self.nodes[from].transport.drain();
        for (channel, event) in published {
            let bytes = match Frame::from_event(&channel, &event).and_then(|f| f.serialize()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "distance event does not fit a frame");
                    continue;
                }
            };

            for to in 0..self.nodes.len() {
                if to == from && !self.echo {
                    continue;
                }
                self.stats.frames_sent += 1;
                self.link(from, to).send(bytes.clone());
            }
        }
    }
}
