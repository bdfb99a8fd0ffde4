//! Sources of per-frame input activation sets
//!
//! Capturing real device input is outside this crate; the client runs from
//! any [`InputSource`], and ships with idle, scripted and random-walk sources.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{InputActivationSet, InputKind};

/// Produces one activation set per client frame
pub trait InputSource {
    fn capture(&mut self) -> InputActivationSet;
}

/// Never presses anything
#[derive(Debug, Default)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn capture(&mut self) -> InputActivationSet {
        InputActivationSet::new()
    }
}

/// Replays a fixed sequence of activation sets, looping at the end
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    frames: Vec<InputActivationSet>,
    cursor: usize,
}

impl ScriptedInput {
    pub fn new(frames: Vec<InputActivationSet>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Walks a square: `side` frames each of right, down, left, up
    pub fn square(side: usize) -> Self {
        let mut frames = Vec::with_capacity(side * 4);
        for kind in [
            InputKind::MoveRight,
            InputKind::MoveDown,
            InputKind::MoveLeft,
            InputKind::MoveUp,
        ] {
            frames.extend(std::iter::repeat(InputActivationSet::with(&[kind])).take(side));
        }
        Self::new(frames)
    }
}

impl InputSource for ScriptedInput {
    fn capture(&mut self) -> InputActivationSet {
        if self.frames.is_empty() {
            return InputActivationSet::new();
        }
        let frame = self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();
        frame
    }
}

/// Random walk: holds a random direction for a random number of frames
pub struct WanderInput {
    rng: StdRng,
    current: InputActivationSet,
    hold_frames: u32,
    max_hold: u32,
}

impl WanderInput {
    pub fn new(max_hold: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), max_hold)
    }

    /// Deterministic walk for reproducible runs
    pub fn with_seed(seed: u64, max_hold: u32) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), max_hold)
    }

    fn with_rng(rng: StdRng, max_hold: u32) -> Self {
        Self {
            rng,
            current: InputActivationSet::new(),
            hold_frames: 0,
            max_hold: max_hold.max(1),
        }
    }

    fn pick_direction(&mut self) -> InputActivationSet {
        let mut set = InputActivationSet::new();
        match self.rng.gen_range(-1..=1) {
            -1 => set.set(InputKind::MoveLeft, true),
            1 => set.set(InputKind::MoveRight, true),
            _ => {}
        }
        match self.rng.gen_range(-1..=1) {
            -1 => set.set(InputKind::MoveUp, true),
            1 => set.set(InputKind::MoveDown, true),
            _ => {}
        }
        set
    }
}

impl InputSource for WanderInput {
    fn capture(&mut self) -> InputActivationSet {
        if self.hold_frames == 0 {
            self.current = self.pick_direction();
            self.hold_frames = self.rng.gen_range(1..=self.max_hold);
        }
        self.hold_frames -= 1;
        self.current
    }
}
