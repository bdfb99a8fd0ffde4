//! Authoritative server session
//!
//! Owns the authoritative entity state and the server tick. Each frame it
//! drains every pending transport event, answers each input sample with
//! exactly one response carrying drift-adjustment metadata, and then advances
//! its tick by exactly one regardless of how many samples arrived.

use crate::connection_manager::{ConnectionManager, InputOutcome};
use log::{debug, error, info, trace, warn};
use shared::codec::{AuthPayload, InputUpdatePayload};
use shared::transport::{Delivery, PeerId, Transport, TransportEvent};
use shared::{
    admit, compute_adjustment, decode_client_stream, encode_server, Admission, ByteBuffer,
    ClientBody, ClientPacket, DriftError, EntityState, ProtocolConfig, ServerBody, ServerPacket,
    TickClock, SPAWN_POSITION,
};

/// Default connection capacity
pub const MAX_CLIENTS: usize = 32;

/// What happened during one server frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Server tick the frame ran at
    pub tick: u64,
    /// Input samples received
    pub inputs: usize,
    /// Hellos sent to newly connected clients
    pub hellos: usize,
    /// Responses sent (Auth or Null)
    pub responses: usize,
    /// Samples dropped without a response
    pub dropped: usize,
    /// Receive buffers discarded as malformed
    pub malformed: usize,
}

pub struct ServerSession {
    config: ProtocolConfig,
    clock: TickClock,
    authority: EntityState,
    connections: ConnectionManager,
    output: ByteBuffer,
}

impl ServerSession {
    pub fn new(config: ProtocolConfig, max_connections: usize) -> Self {
        Self::with_state(config, 0, SPAWN_POSITION, max_connections)
    }

    /// Creates a session starting at an arbitrary tick and position
    pub fn with_state(
        config: ProtocolConfig,
        tick: u64,
        position: EntityState,
        max_connections: usize,
    ) -> Self {
        Self {
            config,
            clock: TickClock::new(tick),
            authority: position,
            connections: ConnectionManager::new(max_connections),
            output: ByteBuffer::for_packets(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.clock.now()
    }

    pub fn authority(&self) -> EntityState {
        self.authority
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Runs one server frame: drain events, answer inputs, observe, advance the tick
    pub fn frame<T: Transport>(&mut self, transport: &mut T) -> FrameReport {
        let mut report = FrameReport {
            tick: self.clock.now(),
            ..FrameReport::default()
        };

        while let Some(event) = transport.poll() {
            match event {
                TransportEvent::Connect(peer) => self.handle_connect(transport, peer, &mut report),
                TransportEvent::Receive(peer, bytes) => {
                    self.handle_receive(transport, peer, &bytes, &mut report)
                }
                TransportEvent::Disconnect(peer) => {
                    self.connections.remove(&peer);
                }
                TransportEvent::Timeout(peer) => {
                    warn!("Client {} timed out", peer);
                    self.connections.remove(&peer);
                }
            }
        }

        self.observe(&report);
        self.clock.advance();
        report
    }

    /// Applies the drift and admission rules to one input sample
    ///
    /// Accepted samples move the authoritative entity and produce `Auth`;
    /// stale samples leave it untouched and produce `Null`. Either way the
    /// response echoes the client's adjustment iteration.
    pub fn respond_to_input(
        &mut self,
        client_tick: u64,
        adjustment_iteration: u8,
        input: &InputUpdatePayload,
    ) -> Result<(ServerPacket, Admission), DriftError> {
        let server_tick = self.clock.now();
        let adjustment =
            compute_adjustment(server_tick, client_tick, self.config.adjustment_window)?;

        let admission = admit(server_tick, client_tick);
        let body = match admission {
            Admission::Accept => {
                if adjustment < 0 {
                    debug!(
                        "Allowing input, client ahead: tick {}, server at {}",
                        client_tick, server_tick
                    );
                } else {
                    debug!("Allowing input, tick {}, server at {}", client_tick, server_tick);
                }

                self.authority = self.config.step(self.authority, &input.activation_set);
                ServerBody::Auth(AuthPayload {
                    x: self.authority.x,
                    y: self.authority.y,
                })
            }
            Admission::Stale => {
                debug!(
                    "Dropping input, too old: tick {}, should be >= {}",
                    client_tick, server_tick
                );
                ServerBody::Null
            }
        };

        let response = ServerPacket {
            tick: server_tick,
            adjustment,
            adjustment_iteration,
            body,
        };
        Ok((response, admission))
    }

    /// Disconnects every client; used when the server shuts down
    pub fn shutdown<T: Transport>(&mut self, transport: &mut T) {
        for peer in self.connections.peers() {
            transport.disconnect(peer);
        }
        while let Some(event) = transport.poll() {
            if let TransportEvent::Disconnect(peer) | TransportEvent::Timeout(peer) = event {
                self.connections.remove(&peer);
            }
        }
    }

    fn handle_connect<T: Transport>(
        &mut self,
        transport: &mut T,
        peer: PeerId,
        report: &mut FrameReport,
    ) {
        if !self.connections.add(peer) {
            warn!("Server full, refusing client {}", peer);
            transport.disconnect(peer);
            return;
        }

        let hello = ServerPacket::hello(self.clock.now(), self.authority);
        if self.send(transport, peer, &hello) {
            report.hellos += 1;
        }
    }

    fn handle_receive<T: Transport>(
        &mut self,
        transport: &mut T,
        peer: PeerId,
        bytes: &[u8],
        report: &mut FrameReport,
    ) {
        if !self.connections.contains(&peer) {
            warn!("Packet from unknown client {}", peer);
            return;
        }

        let packets = match decode_client_stream(bytes) {
            Ok(packets) => packets,
            Err(e) => {
                error!("Discarding malformed buffer from client {}: {}", peer, e);
                report.malformed += 1;
                return;
            }
        };

        for packet in packets {
            self.handle_packet(transport, peer, &packet, report);
        }
    }

    fn handle_packet<T: Transport>(
        &mut self,
        transport: &mut T,
        peer: PeerId,
        packet: &ClientPacket,
        report: &mut FrameReport,
    ) {
        let ClientBody::InputUpdate(input) = &packet.body else {
            warn!("Unexpected packet type from client {}", peer);
            return;
        };
        report.inputs += 1;

        let outcome = match self.respond_to_input(packet.tick, packet.adjustment_iteration, input) {
            Ok((response, admission)) => {
                if self.send(transport, peer, &response) {
                    report.responses += 1;
                }
                match admission {
                    Admission::Accept => InputOutcome::Accepted,
                    Admission::Stale => InputOutcome::Stale,
                }
            }
            Err(e) => {
                warn!("Dropping input from client {}: {}", peer, e);
                report.dropped += 1;
                InputOutcome::Unresolvable
            }
        };

        if let Some(connection) = self.connections.get_mut(&peer) {
            connection.record(packet.tick, packet.adjustment_iteration, outcome);
        }
    }

    /// Encodes and sends one packet; a failed send tears the connection down
    fn send<T: Transport>(&mut self, transport: &mut T, peer: PeerId, packet: &ServerPacket) -> bool {
        self.output.clear();
        if let Err(e) = encode_server(&mut self.output, packet) {
            error!("Failed to encode packet for client {}: {}", peer, e);
            return false;
        }

        match transport.send(peer, self.output.as_slice(), Delivery::Reliable) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send to client {}: {}", peer, e);
                self.connections.remove(&peer);
                transport.disconnect(peer);
                false
            }
        }
    }

    fn observe(&self, report: &FrameReport) {
        trace!(
            "Tick {}: authority at ({:.2}, {:.2}), {} inputs",
            report.tick,
            self.authority.x,
            self.authority.y,
            report.inputs
        );

        let status_interval = u64::from(self.config.tick_rate.max(1)) * 5;
        if report.tick % status_interval == 0 && !self.connections.is_empty() {
            info!(
                "Tick {}: {} clients, authority at ({:.2}, {:.2})",
                report.tick,
                self.connections.len(),
                self.authority.x,
                self.authority.y
            );
        }
    }
}
