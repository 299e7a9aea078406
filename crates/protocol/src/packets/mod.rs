//! Packet definitions for the snakepit protocol.
//!
//! This module contains both client->server and server->client payloads.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Frame opcodes, shared by both directions.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Join with a display name.
    LoginReq = 0x0001,
    /// Assigned id, color and grid dimensions.
    LoginResp = 0x0002,
    /// Requested direction change.
    Move = 0x0003,
    /// Full map snapshot for one tick.
    MapUpdate = 0x0004,
    /// Chat line from a client.
    ChatSend = 0x0005,
    /// Chat line delivered to a client.
    ChatRecv = 0x0006,
    /// Reserved.
    PlayerJoin = 0x0007,
    /// Reserved.
    PlayerLeave = 0x0008,
    /// Reserved.
    PlayerDie = 0x0009,
    /// Leave the game and close.
    Logout = 0x000A,
    /// Heartbeat request.
    Heartbeat = 0x0010,
    /// Heartbeat reply.
    HeartbeatAck = 0x0011,
    /// Error message.
    Error = 0x00FF,
}

impl Opcode {
    pub fn from_u16(v: u16) -> Option<Self> {
        let op = match v {
            0x0001 => Opcode::LoginReq,
            0x0002 => Opcode::LoginResp,
            0x0003 => Opcode::Move,
            0x0004 => Opcode::MapUpdate,
            0x0005 => Opcode::ChatSend,
            0x0006 => Opcode::ChatRecv,
            0x0007 => Opcode::PlayerJoin,
            0x0008 => Opcode::PlayerLeave,
            0x0009 => Opcode::PlayerDie,
            0x000A => Opcode::Logout,
            0x0010 => Opcode::Heartbeat,
            0x0011 => Opcode::HeartbeatAck,
            0x00FF => Opcode::Error,
            _ => return None,
        };
        Some(op)
    }
}

impl From<Opcode> for u16 {
    fn from(op: Opcode) -> u16 {
        op as u16
    }
}
