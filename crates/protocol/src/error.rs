//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while framing, reading or parsing packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Declared payload length {len} exceeds maximum {max}")]
    PayloadTooLarge { len: u32, max: u32 },

    #[error("Checksum mismatch: header says {expected:#06x}, payload sums to {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Unknown packet opcode: {0:#06x}")]
    UnknownOpcode(u16),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Invalid direction: {0}")]
    InvalidDirection(u8),
}

impl ProtocolError {
    /// Whether the stream can no longer be trusted after this error.
    ///
    /// Transport and framing failures poison the connection; payload-level
    /// errors (short payload, unknown opcode, bad direction) leave it usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::PayloadTooLarge { .. }
                | ProtocolError::ChecksumMismatch { .. }
        )
    }
}
