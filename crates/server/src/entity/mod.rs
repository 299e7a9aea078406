//! Game entities.
//!
//! Player slots, their snakes, and food pellets.

mod food;
mod player;
mod snake;

pub use food::Food;
pub use player::{Player, NUM_COLORS, PROTECTION_TICKS, RESPAWN_TICKS};
pub use snake::{Snake, INITIAL_LENGTH};

/// Integer grid position; y grows downwards.
pub type Position = glam::IVec2;
