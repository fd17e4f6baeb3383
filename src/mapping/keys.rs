//! Directional key tracking with edge detection

use std::collections::HashMap;

use tracing::debug;

use crate::link::MotionToken;

/// The four directional keys the controller tracks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Up,
    Down,
    Left,
    Right,
}

impl KeyDirection {
    /// Motion token commanded while this key is held
    pub fn token(self) -> MotionToken {
        match self {
            KeyDirection::Up => MotionToken::Up,
            KeyDirection::Down => MotionToken::Down,
            KeyDirection::Left => MotionToken::Left,
            KeyDirection::Right => MotionToken::Right,
        }
    }
}

/// Tracks held state per direction and turns raw key events into edges
///
/// Press events for a key already held are ignored, which filters OS
/// auto-repeat. A release of any tracked key whose flag is set yields a
/// stop, even while a different key is still held: releasing a secondary
/// key halts all motion. This mirrors the deployed per-key handling and is
/// kept as-is; see DESIGN.md.
#[derive(Debug, Default)]
pub struct KeyInputController {
    held: HashMap<KeyDirection, bool>,
}

impl KeyInputController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a press edge; returns the token to command, or `None` when
    /// the key was already held (auto-repeat)
    pub fn press(&mut self, key: KeyDirection) -> Option<MotionToken> {
        let held = self.held.entry(key).or_insert(false);
        if *held {
            debug!("Ignoring auto-repeat press for {:?}", key);
            return None;
        }
        *held = true;
        Some(key.token())
    }

    /// Handles a release edge; returns true when a stop must be commanded
    ///
    /// True exactly when the key's held flag was set, so each release
    /// produces at most one stop.
    pub fn release(&mut self, key: KeyDirection) -> bool {
        match self.held.get_mut(&key) {
            Some(held) if *held => {
                *held = false;
                true
            }
            _ => {
                debug!("Ignoring release for {:?} without matching press", key);
                false
            }
        }
    }

    /// True while any tracked key is held
    pub fn any_held(&self) -> bool {
        self.held.values().any(|held| *held)
    }

    /// Clears all held flags, e.g. when the session reconnects
    pub fn reset(&mut self) {
        self.held.clear();
    }
}
