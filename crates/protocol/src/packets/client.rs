//! Client -> Server packets.

use super::Opcode;
use crate::binary::str_until_nul;
use crate::{BinaryReader, BinaryWriter, Direction, ProtocolError, MAX_CHAT_LEN, MAX_NAME_LEN};
use bytes::Bytes;

/// Login request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub name: String,
    pub is_ai: bool,
}

impl LoginRequest {
    /// Encoded size: name field plus the AI flag.
    pub const WIRE_LEN: usize = MAX_NAME_LEN + 1;
}

/// Parsed client packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    /// Join the game (0x0001).
    Login(LoginRequest),
    /// Direction request (0x0003).
    Move { direction: Direction },
    /// Chat line (0x0005).
    Chat { text: String },
    /// Keep-alive (0x0010).
    Heartbeat,
    /// Leave and close (0x000A).
    Logout,
}

impl ClientPacket {
    /// Parse a client packet from a verified frame's opcode and payload.
    ///
    /// Server-bound opcodes with a short payload fail with `UnexpectedEof`;
    /// everything a client is not supposed to send is `UnknownOpcode`.
    pub fn parse(opcode: u16, payload: &[u8]) -> Result<Self, ProtocolError> {
        match Opcode::from_u16(opcode) {
            Some(Opcode::LoginReq) => {
                if payload.len() < LoginRequest::WIRE_LEN {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let mut reader = BinaryReader::new(payload.to_vec());
                let name = reader.get_fixed_str(MAX_NAME_LEN)?;
                let name = crate::truncate_utf8(&name, MAX_NAME_LEN - 1).to_owned();
                let is_ai = reader.get_u8()? != 0;
                Ok(ClientPacket::Login(LoginRequest { name, is_ai }))
            }
            Some(Opcode::Move) => {
                let raw = *payload.first().ok_or(ProtocolError::UnexpectedEof)?;
                let direction =
                    Direction::from_u8(raw).ok_or(ProtocolError::InvalidDirection(raw))?;
                Ok(ClientPacket::Move { direction })
            }
            Some(Opcode::ChatSend) => {
                if payload.is_empty() {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let field = &payload[..payload.len().min(MAX_CHAT_LEN)];
                let text = str_until_nul(field);
                let text = crate::truncate_utf8(&text, MAX_CHAT_LEN - 1).to_owned();
                Ok(ClientPacket::Chat { text })
            }
            Some(Opcode::Heartbeat) => Ok(ClientPacket::Heartbeat),
            Some(Opcode::Logout) => Ok(ClientPacket::Logout),
            _ => Err(ProtocolError::UnknownOpcode(opcode)),
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            ClientPacket::Login(_) => Opcode::LoginReq,
            ClientPacket::Move { .. } => Opcode::Move,
            ClientPacket::Chat { .. } => Opcode::ChatSend,
            ClientPacket::Heartbeat => Opcode::Heartbeat,
            ClientPacket::Logout => Opcode::Logout,
        }
    }

    /// Build the plaintext payload.
    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::new();
        match self {
            ClientPacket::Login(req) => {
                w.put_fixed_str(&req.name, MAX_NAME_LEN);
                w.put_u8(u8::from(req.is_ai));
            }
            ClientPacket::Move { direction } => w.put_u8(*direction as u8),
            ClientPacket::Chat { text } => w.put_fixed_str(text, MAX_CHAT_LEN),
            ClientPacket::Heartbeat | ClientPacket::Logout => {}
        }
        w.finish()
    }
}
