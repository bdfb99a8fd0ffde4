//! # Shared protocol library
//!
//! Everything the client and server must agree on bit for bit: the wire
//! codec, the entity kinematics both sides simulate, the tick clock and drift
//! adjustment rules, and the transport abstraction the sessions talk through.
//!
//! ## Modules
//!
//! - `codec`: fixed-layout packet framing into bump buffers and decoding of
//!   concatenated receive buffers
//! - `kinematics`: the deterministic movement step used for prediction and
//!   authority alike
//! - `input`: the per-frame input activation set
//! - `clock`: tick counters, drift computation, and client-side correction
//!   bookkeeping
//! - `pacing`: fixed-rate frame pacing interruptible by shutdown
//! - `transport`: the poll-driven transport trait plus UDP and in-memory
//!   implementations

pub mod clock;
pub mod codec;
pub mod input;
pub mod kinematics;
pub mod pacing;
pub mod transport;

pub use clock::{admit, compute_adjustment, Admission, ClockAdjuster, DriftError, TickClock};
pub use codec::{
    decode_client_stream, decode_server_stream, encode_client, encode_server, ByteBuffer,
    ClientBody, ClientPacket, CodecError, ServerBody, ServerPacket, MAX_PACKET_SIZE,
};
pub use input::{InputActivationSet, InputKind, INPUT_KIND_COUNT};
pub use kinematics::{step, EntityState};

use std::time::Duration;

/// Simulation ticks per second
pub const TICK_RATE: u32 = 20;
/// Entity speed in world units per second
pub const MOVE_SPEED: f32 = 200.0;
/// Tolerance when comparing predicted and authoritative positions
pub const EPSILON: f32 = 1e-4;
/// Ticks a client may run ahead of the server without correction, plus one
pub const ADJUSTMENT_WINDOW: u8 = 2;
pub const DEFAULT_PORT: u16 = 9053;
/// Where the server places the entity before any input arrives
pub const SPAWN_POSITION: EntityState = EntityState { x: 400.0, y: 300.0 };

/// Tunables both sides of a connection must share
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolConfig {
    pub tick_rate: u32,
    pub move_speed: f32,
    pub epsilon: f32,
    pub adjustment_window: u8,
}

impl ProtocolConfig {
    /// Simulation timestep in seconds
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    /// Applies one tick of kinematics with this configuration
    pub fn step(&self, position: EntityState, inputs: &InputActivationSet) -> EntityState {
        kinematics::step(position, inputs, self.move_speed, self.dt())
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            move_speed: MOVE_SPEED,
            epsilon: EPSILON,
            adjustment_window: ADJUSTMENT_WINDOW,
        }
    }
}
