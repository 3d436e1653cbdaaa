//! Proxima Node - Runtime loop implementation
//!
//! One actor per node. Sightings and adapter changes from the scanner,
//! messages from the cluster subscription and the sweep tick are all
//! consumed by a single `select!` loop, so the router is only ever
//! touched from one task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use proxima_core::{
    BeaconSighting, DistanceEvent, NodeName, ProximaConfig, ProximaError, ProximaResult, Timestamp,
};
use proxima_transport::{ClusterMessage, ClusterReceiver};

use crate::{AdapterState, Router, Scanner};

/// Shortest sweep period the node runs with
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Node runtime configuration
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Input queue depth
    pub queue_capacity: usize,
    /// Period of the global sweep tick
    pub sweep_interval: Duration,
}

impl NodeConfig {
    pub fn from_config(config: &ProximaConfig) -> Self {
        NodeConfig {
            sweep_interval: config.sweep_interval(),
            ..NodeConfig::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            queue_capacity: 1024,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Messages accepted by the node actor
#[derive(Clone, Debug)]
pub enum NodeInput {
    Sighting(BeaconSighting),
    AdapterState(AdapterState),
    /// Distance event delivered outside the cluster subscription
    Remote(DistanceEvent),
    Shutdown,
}

#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub inputs: u64,
    pub sightings: u64,
    pub adapter_changes: u64,
    pub cluster_messages: u64,
    pub foreign_channel: u64,
    pub sweeps: u64,
    pub last_sweep_duration: Duration,
}

/// Sender side of a node's input queue
#[derive(Clone, Debug)]
pub struct NodeHandle {
    tx: mpsc::Sender<NodeInput>,
}

impl NodeHandle {
    /// Queue an input, waiting for space
    pub async fn send(&self, input: NodeInput) -> ProximaResult<()> {
        self.tx
            .send(input)
            .await
            .map_err(|_| ProximaError::ChannelClosed)
    }

    /// Queue an input without waiting. When the queue is full the input
    /// is dropped and `QueueFull` returned.
    pub fn try_send(&self, input: NodeInput) -> ProximaResult<()> {
        match self.tx.try_send(input) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(input)) => {
                tracing::warn!(?input, "node queue full, dropping input");
                Err(ProximaError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ProximaError::ChannelClosed),
        }
    }

    pub async fn sighting(&self, sighting: BeaconSighting) -> ProximaResult<()> {
        self.send(NodeInput::Sighting(sighting)).await
    }

    pub async fn adapter_state(&self, state: AdapterState) -> ProximaResult<()> {
        self.send(NodeInput::AdapterState(state)).await
    }

    pub async fn shutdown(&self) -> ProximaResult<()> {
        self.send(NodeInput::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Monotonic clock anchored at node start
#[derive(Clone, Copy, Debug)]
struct Clock {
    start: Instant,
}

impl Clock {
    fn new() -> Self {
        Clock {
            start: Instant::now(),
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.start.elapsed().as_micros() as i64)
    }
}

/// Proxima Node - the runtime entity
pub struct Node<S: Scanner> {
    router: Router,
    scanner: S,
    scanning: bool,
    inbox: mpsc::Receiver<NodeInput>,
    subscription: Option<ClusterReceiver>,
    config: NodeConfig,
    clock: Clock,
    stats: RuntimeStats,
}

impl<S: Scanner> Node<S> {
    /// Create a node and subscribe it to the router's cluster channel
    pub fn new(
        router: Router,
        scanner: S,
        config: NodeConfig,
    ) -> ProximaResult<(Self, NodeHandle)> {
        let subscription = router.transport().subscribe(router.channel())?;
        let (tx, inbox) = mpsc::channel(config.queue_capacity.max(1));

        let node = Node {
            router,
            scanner,
            scanning: false,
            inbox,
            subscription: Some(subscription),
            config,
            clock: Clock::new(),
            stats: RuntimeStats::default(),
        };
        Ok((node, NodeHandle { tx }))
    }

    pub fn name(&self) -> &NodeName {
        self.router.node_name()
    }

    /// Run until `Shutdown` arrives or every handle is dropped. Returns
    /// the node so its final state can be inspected.
    pub async fn run(mut self) -> Self {
        // A zero period would panic inside tokio
        let period = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        let mut sweep = tokio::time::interval(period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        sweep.tick().await;

        tracing::info!(node = %self.name(), channel = self.router.channel(), "node started");

        loop {
            tokio::select! {
                input = self.inbox.recv() => {
                    let Some(input) = input else { break };
                    if !self.handle_input(input) {
                        break;
                    }
                }
                message = next_message(&mut self.subscription) => match message {
                    Some(message) => self.handle_cluster(message),
                    None => {
                        tracing::warn!(node = %self.name(), "cluster subscription closed");
                        self.subscription = None;
                    }
                },
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.inbox.close();
        self.stop_scanning();
        tracing::info!(node = %self.name(), "node stopped");
        self
    }

    /// Handle one input. Returns false on shutdown.
    fn handle_input(&mut self, input: NodeInput) -> bool {
        self.stats.inputs += 1;
        match input {
            NodeInput::Sighting(sighting) => {
                self.stats.sightings += 1;
                let now = self.clock.now();
                self.router.handle_sighting(&sighting, now);
            }
            NodeInput::AdapterState(state) => {
                self.stats.adapter_changes += 1;
                tracing::info!(node = %self.name(), ?state, "adapter state changed");
                if state.is_powered_on() {
                    self.start_scanning();
                } else {
                    self.stop_scanning();
                }
            }
            NodeInput::Remote(event) => {
                let now = self.clock.now();
                self.router.handle_remote(&event, now);
            }
            NodeInput::Shutdown => return false,
        }
        true
    }

    fn handle_cluster(&mut self, message: ClusterMessage) {
        self.stats.cluster_messages += 1;
        if message.channel != self.router.channel() {
            self.stats.foreign_channel += 1;
            return;
        }
        let now = self.clock.now();
        self.router.handle_remote(&message.event, now);
    }

    fn sweep(&mut self) {
        let start = Instant::now();
        self.stats.sweeps += 1;
        let now = self.clock.now();
        self.router.sweep(now);
        self.stats.last_sweep_duration = start.elapsed();
    }

    fn start_scanning(&mut self) {
        if self.scanning {
            return;
        }
        match self.scanner.start_scanning() {
            Ok(()) => self.scanning = true,
            Err(e) => tracing::warn!(node = %self.name(), error = %e, "failed to start scanning"),
        }
    }

    fn stop_scanning(&mut self) {
        if !self.scanning {
            return;
        }
        match self.scanner.stop_scanning() {
            Ok(()) => self.scanning = false,
            Err(e) => tracing::warn!(node = %self.name(), error = %e, "failed to stop scanning"),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }
}

/// Next message from the subscription; pending forever once it is gone
async fn next_message(subscription: &mut Option<ClusterReceiver>) -> Option<ClusterMessage> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use proxima_core::BeaconId;
    use proxima_transport::{ClusterTransport, LocalHub};

    use crate::{presence_entity_id, EntityRegistry, EntityState, MemoryRegistry, NullScanner};
    use crate::{RecordingScanner, ScanCommand};

    fn router(node: &str, hub: &LocalHub, registry: Arc<MemoryRegistry>) -> Router {
        let config = ProximaConfig {
            node_name: NodeName::new(node),
            ..ProximaConfig::default()
        };
        Router::new(&config, registry, Arc::new(hub.transport(node))).unwrap()
    }

    async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_sighting_through_node() {
        let hub = LocalHub::new();
        let registry = Arc::new(MemoryRegistry::new());
        let (node, handle) =
            Node::new(router("N1", &hub, registry.clone()), NullScanner, NodeConfig::default())
                .unwrap();
        let task = tokio::spawn(node.run());

        handle.sighting(BeaconSighting::new("tag", -59)).await.unwrap();
        handle.shutdown().await.unwrap();
        let node = task.await.unwrap();

        assert_eq!(node.stats().sightings, 1);
        assert_eq!(node.router().stats().events_published, 1);
        assert_eq!(
            registry.get(&presence_entity_id(&BeaconId::new("tag"))).unwrap().state,
            EntityState::Room(NodeName::new("N1"))
        );
    }

    #[tokio::test]
    async fn test_adapter_state_drives_scanner() {
        let hub = LocalHub::new();
        let scanner = RecordingScanner::new();
        let (node, handle) = Node::new(
            router("N1", &hub, Arc::new(MemoryRegistry::new())),
            scanner.clone(),
            NodeConfig::default(),
        )
        .unwrap();
        let task = tokio::spawn(node.run());

        handle.adapter_state(AdapterState::PoweredOn).await.unwrap();
        handle.adapter_state(AdapterState::PoweredOn).await.unwrap();
        handle.adapter_state(AdapterState::PoweredOff).await.unwrap();
        handle.adapter_state(AdapterState::PoweredOn).await.unwrap();
        handle.shutdown().await.unwrap();
        let node = task.await.unwrap();

        assert!(!node.is_scanning());
        assert_eq!(
            scanner.commands(),
            vec![
                ScanCommand::Start,
                ScanCommand::Stop,
                ScanCommand::Start,
                ScanCommand::Stop
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_closed_after_shutdown() {
        let hub = LocalHub::new();
        let (node, handle) = Node::new(
            router("N1", &hub, Arc::new(MemoryRegistry::new())),
            NullScanner,
            NodeConfig::default(),
        )
        .unwrap();
        let task = tokio::spawn(node.run());

        handle.shutdown().await.unwrap();
        drop(task.await.unwrap());

        assert!(matches!(
            handle.sighting(BeaconSighting::new("tag", -60)).await,
            Err(ProximaError::ChannelClosed)
        ));
        assert!(matches!(
            handle.try_send(NodeInput::Shutdown),
            Err(ProximaError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_try_send_reports_full_queue() {
        let hub = LocalHub::new();
        let config = NodeConfig {
            queue_capacity: 1,
            ..NodeConfig::default()
        };
        let (node, handle) =
            Node::new(router("N1", &hub, Arc::new(MemoryRegistry::new())), NullScanner, config)
                .unwrap();

        handle.try_send(NodeInput::Sighting(BeaconSighting::new("a", -60))).unwrap();
        assert!(matches!(
            handle.try_send(NodeInput::Sighting(BeaconSighting::new("b", -60))),
            Err(ProximaError::QueueFull)
        ));

        // The queued input is still processed once the node runs
        let task = tokio::spawn(node.run());
        handle.shutdown().await.unwrap();
        let node = task.await.unwrap();
        assert_eq!(node.stats().sightings, 1);
    }

    #[tokio::test]
    async fn test_remote_events_reach_peer() {
        let hub = LocalHub::with_echo();
        let n1_registry = Arc::new(MemoryRegistry::new());
        let n2_registry = Arc::new(MemoryRegistry::new());

        let (n1, h1) =
            Node::new(router("N1", &hub, n1_registry), NullScanner, NodeConfig::default()).unwrap();
        let (n2, h2) = Node::new(
            router("N2", &hub, n2_registry.clone()),
            NullScanner,
            NodeConfig::default(),
        )
        .unwrap();
        let t1 = tokio::spawn(n1.run());
        let t2 = tokio::spawn(n2.run());

        h1.sighting(BeaconSighting::new("tag", -59)).await.unwrap();

        let presence = presence_entity_id(&BeaconId::new("tag"));
        let seen = wait_for(|| {
            n2_registry.get(&presence).map(|e| e.state)
                == Some(EntityState::Room(NodeName::new("N1")))
        })
        .await;
        assert!(seen);

        h1.shutdown().await.unwrap();
        h2.shutdown().await.unwrap();
        let n1 = t1.await.unwrap();
        let n2 = t2.await.unwrap();

        assert_eq!(n2.router().stats().events_received, 1);
        let room = n1.router().aggregator().room(&BeaconId::new("tag")).unwrap();
        assert!(room.reading(&NodeName::new("N1")).is_some());
        assert_eq!(n1.router().stats().events_stale, 0);
    }

    #[tokio::test]
    async fn test_foreign_channel_ignored() {
        let hub = LocalHub::new();
        let (node, handle) = Node::new(
            router("N1", &hub, Arc::new(MemoryRegistry::new())),
            NullScanner,
            NodeConfig::default(),
        )
        .unwrap();
        let task = tokio::spawn(node.run());

        // Same hub, different channel: the node never subscribed to it
        let other = hub.transport("N2");
        let event = DistanceEvent::new(NodeName::new("N2"), BeaconId::new("tag"), "Tag", 1.0);
        other.publish("elsewhere", &event).unwrap();

        handle.send(NodeInput::Remote(event)).await.unwrap();
        handle.shutdown().await.unwrap();
        let node = task.await.unwrap();

        assert_eq!(node.stats().cluster_messages, 0);
        assert_eq!(node.router().stats().events_received, 1);
    }
}
