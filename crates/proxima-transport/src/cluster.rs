//! Cluster transport interface
//!
//! Publication is fire-and-forget: no acknowledgment, no backpressure.
//! Delivery may drop, duplicate or reorder messages. Whether a node's own
//! publication comes back to it depends on the implementation, so
//! consumers must filter self-echoes themselves.

use tokio::sync::mpsc;

use proxima_core::{DistanceEvent, ProximaResult};

/// Default subscription buffer
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 1024;

/// One message delivered on a channel
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterMessage {
    pub channel: String,
    pub event: DistanceEvent,
}

/// Subscription receiver
pub type ClusterReceiver = mpsc::Receiver<ClusterMessage>;

/// Subscription sender
pub type ClusterSender = mpsc::Sender<ClusterMessage>;

/// Cluster-wide broadcast channel
pub trait ClusterTransport: Send + Sync {
    /// Publish an event to every subscriber of `channel`
    fn publish(&self, channel: &str, event: &DistanceEvent) -> ProximaResult<()>;

    /// Receive every message delivered on `channel`
    fn subscribe(&self, channel: &str) -> ProximaResult<ClusterReceiver>;
}

/// Hand a message to a subscriber without waiting. Returns false once
/// the subscriber is gone.
pub(crate) fn deliver(tx: &ClusterSender, message: ClusterMessage) -> bool {
    match tx.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(message)) => {
            tracing::warn!(
                channel = %message.channel,
                beacon = %message.event.beacon_identity,
                "subscriber buffer full, dropping distance event"
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
