//! In-memory transport for running a server and its clients in one process
//!
//! Delivery is always ordered and lossless. Nothing moves until the receiving
//! side polls, so tests control exactly how packets cluster per frame.

use super::{Delivery, PeerId, Transport, TransportError, TransportEvent, SERVER_PEER};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Server end of the loopback hub; hands out connected client endpoints
pub struct LoopbackServer {
    inbox: mpsc::UnboundedReceiver<TransportEvent>,
    inbox_tx: mpsc::UnboundedSender<TransportEvent>,
    clients: HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>,
    next_peer_id: PeerId,
}

impl LoopbackServer {
    pub fn new() -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        Self {
            inbox,
            inbox_tx,
            clients: HashMap::new(),
            next_peer_id: 1,
        }
    }

    /// Connects a new client; both ends observe a `Connect` event on their next poll
    pub fn connect(&mut self) -> LoopbackClient {
        let id = self.next_peer_id;
        self.next_peer_id += 1;

        let (client_tx, client_inbox) = mpsc::unbounded_channel();
        let _ = client_tx.send(TransportEvent::Connect(SERVER_PEER));
        let _ = self.inbox_tx.send(TransportEvent::Connect(id));
        self.clients.insert(id, client_tx.clone());

        LoopbackClient {
            id,
            to_server: self.inbox_tx.clone(),
            inbox: client_inbox,
            inbox_tx: client_tx,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackServer {
    fn send(&mut self, peer: PeerId, bytes: &[u8], _delivery: Delivery) -> Result<(), TransportError> {
        let client = self
            .clients
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        client
            .send(TransportEvent::Receive(SERVER_PEER, bytes.to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        let event = self.inbox.try_recv().ok()?;
        if let TransportEvent::Disconnect(peer) | TransportEvent::Timeout(peer) = &event {
            self.clients.remove(peer);
        }
        Some(event)
    }

    fn disconnect(&mut self, peer: PeerId) {
        if let Some(client) = self.clients.remove(&peer) {
            let _ = client.send(TransportEvent::Disconnect(SERVER_PEER));
            let _ = self.inbox_tx.send(TransportEvent::Disconnect(peer));
        }
    }
}

/// Client end of the loopback hub
pub struct LoopbackClient {
    id: PeerId,
    to_server: mpsc::UnboundedSender<TransportEvent>,
    inbox: mpsc::UnboundedReceiver<TransportEvent>,
    inbox_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl LoopbackClient {
    /// Peer handle the server knows this client by
    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl Transport for LoopbackClient {
    fn send(&mut self, peer: PeerId, bytes: &[u8], _delivery: Delivery) -> Result<(), TransportError> {
        if peer != SERVER_PEER {
            return Err(TransportError::UnknownPeer(peer));
        }
        self.to_server
            .send(TransportEvent::Receive(self.id, bytes.to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        self.inbox.try_recv().ok()
    }

    fn disconnect(&mut self, peer: PeerId) {
        if peer != SERVER_PEER {
            return;
        }
        let _ = self.to_server.send(TransportEvent::Disconnect(self.id));
        let _ = self.inbox_tx.send(TransportEvent::Disconnect(SERVER_PEER));
    }
}
