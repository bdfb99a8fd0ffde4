//! Client session: prediction, reconciliation and tick adjustment
//!
//! The session moves through `Disconnected -> AwaitingHello -> Synchronized`.
//! Once synchronized, every frame it sends its input for the current tick,
//! predicts the entity locally, and then consumes every queued server
//! response: drift adjustments slow down or speed up its tick, and `Auth`
//! positions override the prediction whenever they disagree.

use log::{debug, error, info, warn};
use shared::transport::{Delivery, PeerId, Transport, TransportError, TransportEvent};
use shared::{
    decode_server_stream, encode_client, ByteBuffer, ClientPacket, ClockAdjuster, CodecError,
    EntityState, InputActivationSet, ProtocolConfig, ServerBody, ServerPacket, TickClock,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Disconnected from server")]
    Disconnected,

    #[error("Server timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    AwaitingHello,
    Synchronized,
}

/// What happened during one client frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// The frame was consumed by a pending pause; nothing was simulated or sent
    pub paused: bool,
    pub sent_input: bool,
    /// Server packets decoded this frame
    pub responses: usize,
    /// Drift corrections applied this frame
    pub corrections: usize,
    /// The predicted position was snapped to the authoritative one
    pub snapped: bool,
    /// The receive buffer was discarded as malformed
    pub malformed: bool,
    /// The frame should not sleep out its remaining time
    pub skip_sleep: bool,
    pub tick_advanced: bool,
}

/// Effect of one server packet on the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseEffect {
    pub corrected: bool,
    pub snapped: bool,
}

pub struct ClientSession {
    config: ProtocolConfig,
    state: SessionState,
    clock: TickClock,
    position: EntityState,
    adjuster: ClockAdjuster,
    server: Option<PeerId>,
    output: ByteBuffer,
    packet_log: Vec<u8>,
}

impl ClientSession {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            clock: TickClock::default(),
            position: EntityState::default(),
            adjuster: ClockAdjuster::new(),
            server: None,
            output: ByteBuffer::for_packets(),
            packet_log: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tick(&self) -> u64 {
        self.clock.now()
    }

    /// Locally predicted (or last corrected) entity position
    pub fn position(&self) -> EntityState {
        self.position
    }

    pub fn adjuster(&self) -> &ClockAdjuster {
        &self.adjuster
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Runs one client frame
    ///
    /// A frame owed to a pending pause only consumes the pause and lets the
    /// transport keep the connection alive. Otherwise: send the input (synchronized only), predict, drain and apply
    /// every queued response, decide pacing, and advance the tick
    /// (synchronized only). A lost connection is reported as an error and
    /// leaves the session `Disconnected`.
    pub fn frame<T: Transport>(
        &mut self,
        transport: &mut T,
        input: &InputActivationSet,
    ) -> Result<FrameReport, ClientError> {
        let mut report = FrameReport::default();

        if self.adjuster.take_pause_frame() {
            transport.service();
            report.paused = true;
            report.skip_sleep = self.adjuster.take_catchup_frame();
            return Ok(report);
        }

        if self.state == SessionState::Synchronized {
            self.send_input(transport, input)?;
            report.sent_input = true;
            self.position = self.config.step(self.position, input);
        }

        self.receive(transport, &mut report)?;

        report.skip_sleep = self.adjuster.take_catchup_frame();

        if self.state == SessionState::Synchronized {
            self.clock.advance();
            report.tick_advanced = true;
        }

        Ok(report)
    }

    /// Applies one server packet: drift correction first, then its body
    pub fn apply_response(&mut self, packet: &ServerPacket) -> ResponseEffect {
        let mut effect = ResponseEffect::default();

        if self
            .adjuster
            .apply(packet.adjustment, packet.adjustment_iteration)
        {
            debug!(
                "Adjustment {} applied (iteration {} -> {})",
                packet.adjustment,
                packet.adjustment_iteration,
                self.adjuster.iteration()
            );
            effect.corrected = true;
        }

        match packet.body {
            ServerBody::Null => {}
            ServerBody::Hello(hello) => {
                if self.state == SessionState::Synchronized {
                    warn!("Unexpected hello while synchronized, resynchronizing");
                }
                self.clock.reset_to(hello.tick);
                self.position = EntityState::new(hello.x, hello.y);
                self.state = SessionState::Synchronized;
                info!(
                    "Synchronized at tick {}, position ({:.2}, {:.2})",
                    hello.tick, hello.x, hello.y
                );
            }
            ServerBody::Auth(auth) => {
                let authoritative = auth.position();
                if self.state != SessionState::Synchronized {
                    warn!("Ignoring authoritative position before hello");
                } else if self
                    .position
                    .diverges_from(&authoritative, self.config.epsilon)
                {
                    warn!(
                        "Server disagreed! Forcing position ({:.4}, {:.4}) -> ({:.4}, {:.4})",
                        self.position.x, self.position.y, authoritative.x, authoritative.y
                    );
                    self.position = authoritative;
                    effect.snapped = true;
                }
            }
        }

        effect
    }

    /// Tells the server this client is leaving
    pub fn disconnect<T: Transport>(&mut self, transport: &mut T) {
        if let Some(server) = self.server.take() {
            transport.disconnect(server);
        }
        self.state = SessionState::Disconnected;
    }

    fn send_input<T: Transport>(
        &mut self,
        transport: &mut T,
        input: &InputActivationSet,
    ) -> Result<(), ClientError> {
        let Some(server) = self.server else {
            return Ok(());
        };

        let packet = ClientPacket::input_update(self.clock.now(), self.adjuster.iteration(), *input);
        self.output.clear();
        encode_client(&mut self.output, &packet)?;

        if let Err(e) = transport.send(server, self.output.as_slice(), Delivery::Reliable) {
            error!("Failed to send input: {}", e);
            self.mark_disconnected();
            return Err(e.into());
        }
        Ok(())
    }

    /// Drains the transport, then decodes and applies everything that arrived
    fn receive<T: Transport>(
        &mut self,
        transport: &mut T,
        report: &mut FrameReport,
    ) -> Result<(), ClientError> {
        self.packet_log.clear();

        while let Some(event) = transport.poll() {
            match event {
                TransportEvent::Connect(peer) => {
                    info!("Connected to server, awaiting hello");
                    self.server = Some(peer);
                    self.state = SessionState::AwaitingHello;
                    self.adjuster.reset();
                }
                TransportEvent::Receive(peer, bytes) => {
                    if self.server == Some(peer) {
                        self.packet_log.extend_from_slice(&bytes);
                    } else {
                        warn!("Ignoring {} bytes from unknown peer {}", bytes.len(), peer);
                    }
                }
                TransportEvent::Disconnect(_) => {
                    info!("Server disconnected");
                    self.mark_disconnected();
                    return Err(ClientError::Disconnected);
                }
                TransportEvent::Timeout(_) => {
                    warn!("Server timeout");
                    self.mark_disconnected();
                    return Err(ClientError::Timeout);
                }
            }
        }

        let packets = match decode_server_stream(&self.packet_log) {
            Ok(packets) => packets,
            Err(e) => {
                error!(
                    "Discarding {} byte receive buffer: {}",
                    self.packet_log.len(),
                    e
                );
                report.malformed = true;
                return Ok(());
            }
        };

        for packet in &packets {
            let effect = self.apply_response(packet);
            report.responses += 1;
            report.corrections += usize::from(effect.corrected);
            report.snapped |= effect.snapped;
        }

        Ok(())
    }

    fn mark_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
        self.server = None;
    }
}
