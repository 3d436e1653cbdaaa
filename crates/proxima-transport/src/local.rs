//! In-process cluster hub
//!
//! Every node gets a `LocalTransport` handle onto one shared `LocalHub`.
//! Publishing fans the event out to every other subscriber of the
//! channel. With `echo_to_self` the publisher's own subscriptions receive
//! it too, like a broker that does not filter by sender.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use proxima_core::{DistanceEvent, NodeName, ProximaResult};

use crate::cluster::deliver;
use crate::{ClusterMessage, ClusterReceiver, ClusterSender, ClusterTransport, DEFAULT_SUBSCRIPTION_BUFFER};

struct Subscriber {
    /// `None` for observers that see every publication
    node: Option<NodeName>,
    channel: String,
    tx: ClusterSender,
}

#[derive(Default)]
struct HubInner {
    subscribers: Vec<Subscriber>,
    echo_to_self: bool,
    published: u64,
    delivered: u64,
}

/// Shared broadcast hub
#[derive(Clone, Default)]
pub struct LocalHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LocalHub {
    pub fn new() -> Self {
        LocalHub::default()
    }

    /// Hub that also delivers a node's publications back to itself
    pub fn with_echo() -> Self {
        let hub = LocalHub::default();
        hub.inner.lock().echo_to_self = true;
        hub
    }

    /// Transport handle for one node
    pub fn transport(&self, node: impl Into<NodeName>) -> LocalTransport {
        LocalTransport {
            hub: self.clone(),
            node: node.into(),
        }
    }

    /// Receive every publication on `channel`, whatever its origin
    pub fn observe(&self, channel: &str) -> ClusterReceiver {
        self.register(None, channel)
    }

    /// Number of publications so far
    pub fn published(&self) -> u64 {
        self.inner.lock().published
    }

    /// Number of successful hand-overs to subscribers
    pub fn delivered(&self) -> u64 {
        self.inner.lock().delivered
    }

    fn register(&self, node: Option<NodeName>, channel: &str) -> ClusterReceiver {
        let (tx, rx) = mpsc::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        self.inner.lock().subscribers.push(Subscriber {
            node,
            channel: channel.to_string(),
            tx,
        });
        rx
    }

    fn broadcast(&self, from: &NodeName, channel: &str, event: &DistanceEvent) {
        let mut inner = self.inner.lock();
        inner.published += 1;
        let echo = inner.echo_to_self;
        let mut delivered = 0;

        inner.subscribers.retain(|sub| {
            if sub.channel != channel {
                return !sub.tx.is_closed();
            }
            if !echo && sub.node.as_ref() == Some(from) {
                return true;
            }
            let message = ClusterMessage {
                channel: channel.to_string(),
                event: event.clone(),
            };
            let alive = deliver(&sub.tx, message);
            if alive {
                delivered += 1;
            }
            alive
        });
        inner.delivered += delivered;
    }
}

/// One node's handle onto a `LocalHub`
#[derive(Clone)]
pub struct LocalTransport {
    hub: LocalHub,
    node: NodeName,
}

impl LocalTransport {
    pub fn node(&self) -> &NodeName {
        &self.node
    }

    pub fn hub(&self) -> &LocalHub {
        &self.hub
    }
}

impl ClusterTransport for LocalTransport {
    fn publish(&self, channel: &str, event: &DistanceEvent) -> ProximaResult<()> {
        self.hub.broadcast(&self.node, channel, event);
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> ProximaResult<ClusterReceiver> {
        Ok(self.hub.register(Some(self.node.clone()), channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_core::BeaconId;

    fn event(node: &str) -> DistanceEvent {
        DistanceEvent::new(NodeName::new(node), BeaconId::new("tag"), "Tag", 1.0)
    }

    #[tokio::test]
    async fn test_fan_out_skips_publisher() {
        let hub = LocalHub::new();
        let n1 = hub.transport("N1");
        let n2 = hub.transport("N2");

        let mut rx1 = n1.subscribe("c").unwrap();
        let mut rx2 = n2.subscribe("c").unwrap();

        n1.publish("c", &event("N1")).unwrap();

        let got = rx2.recv().await.unwrap();
        assert_eq!(got.event, event("N1"));
        assert!(rx1.try_recv().is_err());
        assert_eq!(hub.delivered(), 1);
    }

    #[tokio::test]
    async fn test_echo_hub_delivers_to_self() {
        let hub = LocalHub::with_echo();
        let n1 = hub.transport("N1");
        let mut rx1 = n1.subscribe("c").unwrap();

        n1.publish("c", &event("N1")).unwrap();
        assert_eq!(rx1.recv().await.unwrap().event.originating_node, NodeName::new("N1"));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let hub = LocalHub::new();
        let n1 = hub.transport("N1");
        let mut other = hub.transport("N2").subscribe("other").unwrap();
        let mut observer = hub.observe("c");

        n1.publish("c", &event("N1")).unwrap();

        assert_eq!(observer.recv().await.unwrap().channel, "c");
        assert!(other.try_recv().is_err());
        assert_eq!(hub.published(), 1);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let hub = LocalHub::new();
        let n1 = hub.transport("N1");
        drop(hub.transport("N2").subscribe("c").unwrap());

        n1.publish("c", &event("N1")).unwrap();
        assert_eq!(hub.delivered(), 0);
        assert!(hub.inner.lock().subscribers.is_empty());
    }
}
