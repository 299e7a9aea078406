//! Shared protocol crate for snakepit.
//!
//! This crate contains:
//! - Big-endian binary reading/writing utilities
//! - Frame header, checksum and payload obfuscation, plus async transport
//! - Packet definitions and payload layouts
//! - Shared types (Direction)

mod binary;
mod error;
pub mod frame;
pub mod packets;

pub use binary::{truncate_utf8, BinaryReader, BinaryWriter};
pub use error::ProtocolError;
pub use frame::{
    decode_frame, encode_frame, read_frame, read_frame_timeout, split_frame, write_frame, Frame,
    RecvOutcome, MAX_PAYLOAD_SIZE,
};

/// Width of a name field on the wire (15 usable bytes + NUL).
pub const MAX_NAME_LEN: usize = 16;
/// Width of a chat text field on the wire (127 usable bytes + NUL).
pub const MAX_CHAT_LEN: usize = 128;

/// Movement direction of a snake.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Parse a wire value; anything past `Right` is rejected.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Direction::Up),
            1 => Some(Direction::Down),
            2 => Some(Direction::Left),
            3 => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Grid offset `(dx, dy)`; y grows downwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}
