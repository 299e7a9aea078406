//! Server -> Client packets.

use super::Opcode;
use crate::binary::str_until_nul;
use crate::{BinaryReader, BinaryWriter, ProtocolError, MAX_CHAT_LEN, MAX_NAME_LEN};
use bytes::Bytes;

/// Reply to a successful login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginResponse {
    pub player_id: u32,
    pub color: u8,
    pub grid_width: u16,
    pub grid_height: u16,
}

impl LoginResponse {
    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::with_capacity(9);
        w.put_u32(self.player_id);
        w.put_u8(self.color);
        w.put_u16(self.grid_width);
        w.put_u16(self.grid_height);
        w.finish()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BinaryReader::new(payload.to_vec());
        Ok(Self {
            player_id: r.get_u32()?,
            color: r.get_u8()?,
            grid_width: r.get_u16()?,
            grid_height: r.get_u16()?,
        })
    }
}

/// Per-slot scoreboard entry inside a map update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotSummary {
    pub score: i32,
    pub alive: bool,
    pub active: bool,
    pub name: String,
}

/// Full snapshot of the map for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapUpdate {
    pub tick: u32,
    pub width: u16,
    pub height: u16,
    /// Row-major cell codes, `width * height` bytes.
    pub cells: Vec<u8>,
    /// One entry per player slot, in slot order.
    pub slots: Vec<SlotSummary>,
}

impl MapUpdate {
    /// Encoded size of a snapshot of a `width` x `height` grid with `slots`
    /// player slots.
    pub fn wire_len(width: usize, height: usize, slots: usize) -> usize {
        10 + width * height + slots * (6 + MAX_NAME_LEN)
    }

    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::with_capacity(Self::wire_len(
            self.width as usize,
            self.height as usize,
            self.slots.len(),
        ));
        w.put_u32(self.tick);
        w.put_u16(self.width);
        w.put_u16(self.height);
        w.put_slice(&self.cells);
        w.put_u16(self.slots.len() as u16);
        for slot in &self.slots {
            w.put_i32(slot.score);
            w.put_u8(u8::from(slot.alive));
            w.put_u8(u8::from(slot.active));
            w.put_fixed_str(&slot.name, MAX_NAME_LEN);
        }
        w.finish()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BinaryReader::new(payload.to_vec());
        let tick = r.get_u32()?;
        let width = r.get_u16()?;
        let height = r.get_u16()?;
        let cells = r.get_bytes(width as usize * height as usize)?.to_vec();
        let count = r.get_u16()?;
        let mut slots = Vec::with_capacity(count as usize);
        for _ in 0..count {
            slots.push(SlotSummary {
                score: r.get_i32()?,
                alive: r.get_u8()? != 0,
                active: r.get_u8()? != 0,
                name: r.get_fixed_str(MAX_NAME_LEN)?,
            });
        }
        Ok(Self {
            tick,
            width,
            height,
            cells,
            slots,
        })
    }

    /// Cell code at `(x, y)`, if inside the grid.
    pub fn cell(&self, x: u16, y: u16) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// A chat line delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecv {
    pub sender_id: u32,
    pub sender_name: String,
    pub text: String,
}

impl ChatRecv {
    pub const WIRE_LEN: usize = 4 + MAX_NAME_LEN + MAX_CHAT_LEN;

    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::with_capacity(Self::WIRE_LEN);
        w.put_u32(self.sender_id);
        w.put_fixed_str(&self.sender_name, MAX_NAME_LEN);
        w.put_fixed_str(&self.text, MAX_CHAT_LEN);
        w.finish()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BinaryReader::new(payload.to_vec());
        Ok(Self {
            sender_id: r.get_u32()?,
            sender_name: r.get_fixed_str(MAX_NAME_LEN)?,
            text: r.get_fixed_str(MAX_CHAT_LEN)?,
        })
    }
}

/// Parsed server packet, as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    LoginResponse(LoginResponse),
    MapUpdate(MapUpdate),
    ChatRecv(ChatRecv),
    HeartbeatAck,
    Error { message: String },
}

impl ServerPacket {
    pub fn parse(opcode: u16, payload: &[u8]) -> Result<Self, ProtocolError> {
        match Opcode::from_u16(opcode) {
            Some(Opcode::LoginResp) => Ok(ServerPacket::LoginResponse(LoginResponse::decode(payload)?)),
            Some(Opcode::MapUpdate) => Ok(ServerPacket::MapUpdate(MapUpdate::decode(payload)?)),
            Some(Opcode::ChatRecv) => Ok(ServerPacket::ChatRecv(ChatRecv::decode(payload)?)),
            Some(Opcode::HeartbeatAck) => Ok(ServerPacket::HeartbeatAck),
            Some(Opcode::Error) => Ok(ServerPacket::Error {
                message: str_until_nul(payload),
            }),
            _ => Err(ProtocolError::UnknownOpcode(opcode)),
        }
    }
}

/// Build an ERROR payload.
pub fn build_error(message: &str) -> Bytes {
    Bytes::copy_from_slice(message.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_update_layout() {
        let update = MapUpdate {
            tick: 7,
            width: 3,
            height: 2,
            cells: vec![1, 1, 1, 1, 2, 10],
            slots: vec![
                SlotSummary {
                    score: 20,
                    alive: true,
                    active: true,
                    name: "ann".into(),
                },
                SlotSummary::default(),
            ],
        };
        let payload = update.encode();
        assert_eq!(payload.len(), 4 + 2 + 2 + 6 + 2 + 2 * (4 + 1 + 1 + MAX_NAME_LEN));
        assert_eq!(payload.len(), MapUpdate::wire_len(3, 2, 2));
        let decoded = MapUpdate::decode(&payload).unwrap();
        assert_eq!(decoded, update);
        assert_eq!(decoded.cell(2, 1), Some(10));
        assert_eq!(decoded.cell(3, 0), None);
    }

    #[test]
    fn test_chat_recv_is_fixed_width() {
        let chat = ChatRecv {
            sender_id: 0,
            sender_name: "SYSTEM".into(),
            text: "bob joined!".into(),
        };
        assert_eq!(chat.encode().len(), ChatRecv::WIRE_LEN);
    }

    #[test]
    fn test_parse_error_packet() {
        let packet = ServerPacket::parse(0x00FF, &build_error("Server Full")).unwrap();
        assert_eq!(
            packet,
            ServerPacket::Error {
                message: "Server Full".into()
            }
        );
    }
}
