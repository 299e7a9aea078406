//! Food pellet.

use super::Position;

/// A food slot. Inactive slots are free for the next spawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Food {
    pub pos: Position,
    pub active: bool,
}
