//! Tick clocks and the drift adjustment protocol
//!
//! The server measures how far each client's tick is from where it should be
//! and stamps a signed adjustment on its response. The client consumes each
//! adjustment at most once, identified by the adjustment iteration the client
//! was at when it sent the packet that produced it:
//!
//! - negative adjustment: the client is ahead, so it pauses tick advancement
//!   for that many frames
//! - positive adjustment: the client is behind, so it skips frame-pacing
//!   sleeps for that many frames to run faster
//!
//! After applying a correction the client increments its iteration, so every
//! further response stamped with the old iteration is ignored.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftError {
    #[error("Tick difference {diff} is outside the representable adjustment range")]
    OutOfRange { diff: i128 },
}

/// Integer simulation tick counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickClock {
    tick: u64,
}

impl TickClock {
    pub fn new(tick: u64) -> Self {
        Self { tick }
    }

    pub fn now(&self) -> u64 {
        self.tick
    }

    /// Advances by exactly one tick
    pub fn advance(&mut self) {
        self.tick += 1;
    }

    /// Jumps to a tick supplied by the other side (e.g. the server handshake)
    pub fn reset_to(&mut self, tick: u64) {
        self.tick = tick;
    }
}

/// Computes the adjustment the server stamps on its response to a client packet
///
/// `diff = server_tick + (window - 1) - client_tick`. A client inside
/// `-(window - 1)..=0` needs no correction. Differences that do not fit an
/// `i8` cannot be expressed on the wire and are reported as errors.
pub fn compute_adjustment(server_tick: u64, client_tick: u64, window: u8) -> Result<i8, DriftError> {
    let slack = i128::from(window.max(1)) - 1;
    let diff = i128::from(server_tick) + slack - i128::from(client_tick);

    let adjustment = i8::try_from(diff).map_err(|_| DriftError::OutOfRange { diff })?;

    if diff < -slack || diff > 0 {
        Ok(adjustment)
    } else {
        Ok(0)
    }
}

/// Server decision on an input sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The sample is for the current tick or later; apply it
    Accept,
    /// The sample is for a tick the server has already passed; drop it
    Stale,
}

/// Accepts an input iff `client_tick >= server_tick`
pub fn admit(server_tick: u64, client_tick: u64) -> Admission {
    if client_tick >= server_tick {
        Admission::Accept
    } else {
        Admission::Stale
    }
}

/// Client-side bookkeeping of pending drift corrections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockAdjuster {
    iteration: u8,
    pause_frames: u32,
    catchup_frames: u32,
}

impl ClockAdjuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iteration stamped on outgoing packets
    pub fn iteration(&self) -> u8 {
        self.iteration
    }

    pub fn pause_frames(&self) -> u32 {
        self.pause_frames
    }

    pub fn catchup_frames(&self) -> u32 {
        self.catchup_frames
    }

    /// Applies a correction if it is nonzero and has not been consumed yet
    ///
    /// Returns true if the correction was applied.
    pub fn apply(&mut self, adjustment: i8, adjustment_iteration: u8) -> bool {
        if adjustment == 0 || adjustment_iteration != self.iteration {
            return false;
        }

        if adjustment < 0 {
            self.pause_frames += u32::from(adjustment.unsigned_abs());
        } else {
            self.catchup_frames += u32::from(adjustment.unsigned_abs());
        }
        self.iteration = self.iteration.wrapping_add(1);
        true
    }

    /// Consumes one paused frame; true if this frame must not advance the simulation
    pub fn take_pause_frame(&mut self) -> bool {
        if self.pause_frames > 0 {
            self.pause_frames -= 1;
            true
        } else {
            false
        }
    }

    /// Consumes one catch-up frame; true if this frame should skip its pacing sleep
    pub fn take_catchup_frame(&mut self) -> bool {
        if self.catchup_frames > 0 {
            self.catchup_frames -= 1;
            true
        } else {
            false
        }
    }

    /// Forgets every pending correction; used when a connection is (re)established
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
