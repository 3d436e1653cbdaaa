//! UDP transport implementation
//!
//! Each publication is queued as one datagram per configured peer and
//! written by a background send loop. A background receive loop decodes
//! incoming frames and hands them to the subscribers of the frame's channel.
//! Both loops are aborted when the transport is dropped, releasing the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use bytes::Bytes;

use proxima_core::{DistanceEvent, ProximaError, ProximaResult};
use proxima_wire::{Frame, MAX_FRAME_SIZE};

use crate::cluster::deliver;
use crate::{ClusterMessage, ClusterReceiver, ClusterSender, ClusterTransport, DEFAULT_SUBSCRIPTION_BUFFER};

type Subscriptions = Arc<Mutex<Vec<(String, ClusterSender)>>>;

/// Outgoing datagram queue
pub type PacketSender = mpsc::Sender<(Bytes, SocketAddr)>;

/// Outgoing datagram queue, receiving side
pub type PacketReceiver = mpsc::Receiver<(Bytes, SocketAddr)>;

/// Outgoing queue depth
const SEND_BUFFER: usize = 1024;

/// UDP transport for a static peer list
pub struct UdpTransport {
    outgoing: PacketSender,
    local_addr: SocketAddr,
    peers: Vec<SocketAddr>,
    subscriptions: Subscriptions,
    /// Send and receive loops
    tasks: [JoinHandle<()>; 2],
}

impl UdpTransport {
    /// Bind to a local address and start the send and receive loops.
    /// Must be called from within a tokio runtime.
    pub async fn bind(addr: SocketAddr, peers: Vec<SocketAddr>) -> ProximaResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| ProximaError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| ProximaError::TransportError(e.to_string()))?;

        let socket = Arc::new(socket);
        let subscriptions: Subscriptions = Arc::default();
        let receiver = start_receive_loop(Arc::clone(&socket), Arc::clone(&subscriptions));
        let (outgoing, sender) = start_send_loop(socket);

        tracing::info!(%local_addr, peers = peers.len(), "UDP cluster transport bound");
        Ok(UdpTransport {
            outgoing,
            local_addr,
            peers,
            subscriptions,
            tasks: [sender, receiver],
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    /// Add a peer after binding
    pub fn add_peer(&mut self, peer: SocketAddr) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::debug!(local_addr = %self.local_addr, "UDP cluster transport closed");
    }
}

impl ClusterTransport for UdpTransport {
    fn publish(&self, channel: &str, event: &DistanceEvent) -> ProximaResult<()> {
        let bytes = Frame::from_event(channel, event)?.serialize()?;

        for peer in &self.peers {
            match self.outgoing.try_send((bytes.clone(), *peer)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(%peer, "UDP send queue full, dropping datagram");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(ProximaError::ChannelClosed);
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> ProximaResult<ClusterReceiver> {
        let (tx, rx) = mpsc::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        self.subscriptions.lock().push((channel.to_string(), tx));
        Ok(rx)
    }
}

/// Start a background send loop draining the outgoing queue
fn start_send_loop(socket: Arc<UdpSocket>) -> (PacketSender, JoinHandle<()>) {
    let (tx, mut rx): (PacketSender, PacketReceiver) = mpsc::channel(SEND_BUFFER);

    let task = tokio::spawn(async move {
        while let Some((bytes, peer)) = rx.recv().await {
            if let Err(e) = socket.send_to(&bytes, peer).await {
                tracing::warn!(%peer, error = %e, "UDP publish failed");
            }
        }
    });

    (tx, task)
}

/// Start a background receive loop dispatching frames to subscribers
fn start_receive_loop(socket: Arc<UdpSocket>, subscriptions: Subscriptions) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        loop {
            let (len, addr) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                    continue;
                }
            };

            let decoded = Frame::parse(&buf[..len]).and_then(|frame| {
                let event = frame.event()?;
                Ok(ClusterMessage {
                    channel: frame.channel,
                    event,
                })
            });
            let message = match decoded {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(%addr, error = %e, "dropping undecodable datagram");
                    continue;
                }
            };

            let mut subs = subscriptions.lock();
            subs.retain(|(channel, tx)| {
                if *channel != message.channel {
                    return !tx.is_closed();
                }
                deliver(tx, message.clone())
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_core::{BeaconId, NodeName};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_udp_transport_bind() {
        let transport = UdpTransport::bind(loopback(), Vec::new()).await.unwrap();
        assert_ne!(transport.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_port() {
        let transport = UdpTransport::bind(loopback(), Vec::new()).await.unwrap();
        let addr = transport.local_addr();
        drop(transport);

        // Aborted loops release the socket on their next poll
        let mut rebound = None;
        for _ in 0..100 {
            match UdpTransport::bind(addr, Vec::new()).await {
                Ok(transport) => {
                    rebound = Some(transport);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
        assert_eq!(rebound.map(|t| t.local_addr()), Some(addr));
    }

    #[tokio::test]
    async fn test_udp_publish_reaches_peer() {
        let receiver = UdpTransport::bind(loopback(), Vec::new()).await.unwrap();
        let mut rx = receiver.subscribe("proxima.distance").unwrap();
        let sender = UdpTransport::bind(loopback(), vec![receiver.local_addr()])
            .await
            .unwrap();

        let event = DistanceEvent::new(NodeName::new("N1"), BeaconId::new("tag"), "Tag", 2.3)
            .with_sequence(1);
        sender.publish("proxima.distance", &event).unwrap();

        let got = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.event, event);
        assert_eq!(got.channel, "proxima.distance");
    }

    #[tokio::test]
    async fn test_udp_garbage_is_skipped() {
        let receiver = UdpTransport::bind(loopback(), Vec::new()).await.unwrap();
        let mut rx = receiver.subscribe("c").unwrap();

        let raw = UdpSocket::bind(loopback()).await.unwrap();
        raw.send_to(b"not a frame", receiver.local_addr()).await.unwrap();

        let sender = UdpTransport::bind(loopback(), vec![receiver.local_addr()])
            .await
            .unwrap();
        let event = DistanceEvent::new(NodeName::new("N2"), BeaconId::new("tag"), "Tag", 4.0);
        sender.publish("c", &event).unwrap();

        let got = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.event.originating_node, NodeName::new("N2"));
    }
}
