//! Per-connection protocol bookkeeping for the authoritative server
//!
//! Each connection's state is mutated only by the server loop, strictly while
//! it processes that frame's received packets, so no locking is involved.

use log::info;
use shared::transport::PeerId;
use std::collections::HashMap;
use std::time::Instant;

/// How the server disposed of one input sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Applied to the authoritative state and answered with `Auth`
    Accepted,
    /// Too old to apply; answered with `Null`
    Stale,
    /// Drift too large to express; dropped without a response
    Unresolvable,
}

/// A connected client and what the server has seen from it
#[derive(Debug)]
pub struct Connection {
    /// Transport handle used for responses
    pub peer: PeerId,
    pub connected_at: Instant,
    /// Tick stamped on the most recent input
    pub last_client_tick: Option<u64>,
    /// Adjustment iteration echoed in the most recent response
    pub last_iteration: u8,
    pub accepted: u64,
    pub stale: u64,
    pub unresolvable: u64,
}

impl Connection {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            connected_at: Instant::now(),
            last_client_tick: None,
            last_iteration: 0,
            accepted: 0,
            stale: 0,
            unresolvable: 0,
        }
    }

    /// Records an input sample and its outcome
    pub fn record(&mut self, client_tick: u64, iteration: u8, outcome: InputOutcome) {
        self.last_client_tick = Some(client_tick);
        self.last_iteration = iteration;
        match outcome {
            InputOutcome::Accepted => self.accepted += 1,
            InputOutcome::Stale => self.stale += 1,
            InputOutcome::Unresolvable => self.unresolvable += 1,
        }
    }

    /// Total inputs received from this connection
    pub fn inputs(&self) -> u64 {
        self.accepted + self.stale + self.unresolvable
    }
}

/// Connected clients indexed by transport handle, with a capacity limit
pub struct ConnectionManager {
    connections: HashMap<PeerId, Connection>,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Registers a new connection; false if the server is at capacity
    ///
    /// A peer that is already registered starts over with fresh bookkeeping.
    pub fn add(&mut self, peer: PeerId) -> bool {
        if !self.connections.contains_key(&peer) && self.connections.len() >= self.max_connections {
            return false;
        }

        info!("Client {} connected", peer);
        self.connections.insert(peer, Connection::new(peer));
        true
    }

    /// Removes a connection, returning its final bookkeeping
    pub fn remove(&mut self, peer: &PeerId) -> Option<Connection> {
        let connection = self.connections.remove(peer)?;
        info!(
            "Client {} disconnected ({} accepted, {} stale, {} unresolvable)",
            peer, connection.accepted, connection.stale, connection.unresolvable
        );
        Some(connection)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&Connection> {
        self.connections.get(peer)
    }

    pub fn get_mut(&mut self, peer: &PeerId) -> Option<&mut Connection> {
        self.connections.get_mut(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.connections.contains_key(peer)
    }

    /// Handles of every connected client
    pub fn peers(&self) -> Vec<PeerId> {
        self.connections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
