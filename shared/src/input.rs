//! Abstract input activation sets shared by client prediction and server authority

use serde::{Deserialize, Serialize};

/// Number of input kinds, including the reserved `None` sentinel
pub const INPUT_KIND_COUNT: usize = 5;

/// Ordinally indexed input kinds
///
/// `None` occupies index 0 and is never set in an activation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InputKind {
    None = 0,
    MoveLeft = 1,
    MoveRight = 2,
    MoveUp = 3,
    MoveDown = 4,
}

impl InputKind {
    /// Every settable input kind, in ordinal order
    pub const MOVEMENT: [InputKind; 4] = [
        InputKind::MoveLeft,
        InputKind::MoveRight,
        InputKind::MoveUp,
        InputKind::MoveDown,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One boolean flag per input kind, captured once per client frame
///
/// On the wire this is the bare flag array. Decoding clears the `None` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[bool; INPUT_KIND_COUNT]", into = "[bool; INPUT_KIND_COUNT]")]
pub struct InputActivationSet {
    active: [bool; INPUT_KIND_COUNT],
}

impl InputActivationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set with the given kinds active
    pub fn with(kinds: &[InputKind]) -> Self {
        let mut set = Self::new();
        for &kind in kinds {
            set.set(kind, true);
        }
        set
    }

    /// Marks an input kind as active or inactive. The `None` sentinel is ignored.
    pub fn set(&mut self, kind: InputKind, active: bool) {
        if kind == InputKind::None {
            return;
        }
        self.active[kind.index()] = active;
    }

    pub fn is_active(&self, kind: InputKind) -> bool {
        self.active[kind.index()]
    }

    /// True if any input kind is active
    pub fn any(&self) -> bool {
        self.active.iter().any(|&a| a)
    }

    pub fn clear(&mut self) {
        self.active = [false; INPUT_KIND_COUNT];
    }

    /// Iterates over the active input kinds
    pub fn active_kinds(&self) -> impl Iterator<Item = InputKind> + '_ {
        InputKind::MOVEMENT
            .into_iter()
            .filter(move |kind| self.is_active(*kind))
    }
}

impl From<[bool; INPUT_KIND_COUNT]> for InputActivationSet {
    fn from(mut active: [bool; INPUT_KIND_COUNT]) -> Self {
        active[InputKind::None.index()] = false;
        Self { active }
    }
}

impl From<InputActivationSet> for [bool; INPUT_KIND_COUNT] {
    fn from(set: InputActivationSet) -> Self {
        set.active
    }
}
