//! Message transport consumed by the client and server sessions
//!
//! Sessions only see opaque byte payloads delivered to or from a peer handle;
//! everything else (sockets, handshakes, timeouts) lives behind [`Transport`].

pub mod loopback;
pub mod udp;

use std::net::SocketAddr;
use thiserror::Error;

/// Handle identifying a connected peer
pub type PeerId = u32;

/// Peer handle a client uses for its server
pub const SERVER_PEER: PeerId = 0;

/// Connection events surfaced by [`Transport::poll`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect(PeerId),
    Receive(PeerId, Vec<u8>),
    Disconnect(PeerId),
    Timeout(PeerId),
}

/// Delivery guarantee requested for a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Reliable,
    Unreliable,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("Connection rejected by {0}")]
    Rejected(SocketAddr),

    #[error("Unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("Transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-blocking, poll-driven message transport
pub trait Transport {
    /// Queues `bytes` for delivery to `peer`
    fn send(&mut self, peer: PeerId, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError>;

    /// Returns the next pending event, or `None` once nothing is queued
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Gracefully disconnects `peer` and queues a local `Disconnect` event for it
    fn disconnect(&mut self, peer: PeerId);

    /// Keeps connections alive on frames that neither send nor poll
    ///
    /// Never surfaces events; anything received stays queued for `poll`.
    fn service(&mut self) {}
}
