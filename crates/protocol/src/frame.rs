//! Frame layer: header, checksum, obfuscation and transport.
//!
//! A frame is an 8-byte big-endian header `{length: u32, opcode: u16,
//! checksum: u16}` followed by `length` payload bytes. The checksum is the
//! 16-bit truncated sum of the plaintext payload; the payload is XORed with
//! [`XOR_KEY`] after the checksum is taken. Receivers reverse the XOR before
//! verifying.

use crate::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 8;
/// Shared obfuscation key. Not a cryptographic guarantee.
pub const XOR_KEY: u8 = 0x5A;
/// Largest payload a peer may declare.
pub const MAX_PAYLOAD_SIZE: u32 = 65536;

/// Additive 16-bit checksum over plaintext bytes.
pub fn checksum(data: &[u8]) -> u16 {
    let sum = data
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
    (sum & 0xFFFF) as u16
}

/// XOR every byte with the shared key. Applying it twice is the identity.
pub fn xor_cipher(data: &mut [u8]) {
    for b in data.iter_mut() {
        *b ^= XOR_KEY;
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub opcode: u16,
    pub checksum: u16,
}

impl FrameHeader {
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..6].copy_from_slice(&self.opcode.to_be_bytes());
        out[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        out
    }

    pub fn from_bytes(raw: [u8; HEADER_LEN]) -> Self {
        Self {
            length: u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
            opcode: u16::from_be_bytes([raw[4], raw[5]]),
            checksum: u16::from_be_bytes([raw[6], raw[7]]),
        }
    }

    /// Reject oversize declarations before any payload is read.
    fn payload_len(&self) -> Result<usize, ProtocolError> {
        if self.length > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                len: self.length,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(self.length as usize)
    }
}

/// A received frame with its payload already de-obfuscated and verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u16,
    pub payload: Bytes,
}

/// Outcome of [`read_frame_timeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvOutcome {
    Frame(Frame),
    /// Nothing arrived within the wait; no bytes were consumed.
    TimedOut,
}

/// Build the on-wire bytes for one frame.
pub fn encode_frame(opcode: u16, payload: &[u8]) -> Result<Bytes, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(ProtocolError::PayloadTooLarge {
            len: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let header = FrameHeader {
        length: payload.len() as u32,
        opcode,
        checksum: if payload.is_empty() { 0 } else { checksum(payload) },
    };

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&header.to_bytes());
    let start = buf.len();
    buf.put_slice(payload);
    xor_cipher(&mut buf[start..]);
    Ok(buf.freeze())
}

/// Decode the first frame in `data`.
pub fn decode_frame(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::UnexpectedEof);
    }
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&data[..HEADER_LEN]);
    let header = FrameHeader::from_bytes(raw);
    let len = header.payload_len()?;

    let body = data
        .get(HEADER_LEN..HEADER_LEN + len)
        .ok_or(ProtocolError::UnexpectedEof)?;
    open_payload(header, BytesMut::from(body))
}

/// Take the first complete frame off the front of `buf`.
///
/// Returns `Ok(None)` while the frame is still incomplete. An oversize
/// declaration is rejected as soon as the header is buffered, before any of
/// its payload arrives.
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&buf[..HEADER_LEN]);
    let header = FrameHeader::from_bytes(raw);
    let len = header.payload_len()?;
    if buf.len() < HEADER_LEN + len {
        buf.reserve(HEADER_LEN + len - buf.len());
        return Ok(None);
    }

    let _ = buf.split_to(HEADER_LEN);
    let payload = buf.split_to(len);
    open_payload(header, payload).map(Some)
}

fn open_payload(header: FrameHeader, mut payload: BytesMut) -> Result<Frame, ProtocolError> {
    if !payload.is_empty() {
        xor_cipher(&mut payload);
        let actual = checksum(&payload);
        if actual != header.checksum {
            return Err(ProtocolError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }
    }
    Ok(Frame {
        opcode: header.opcode,
        payload: payload.freeze(),
    })
}

fn map_read_error(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(e)
    }
}

/// Send one frame, retrying partial writes until it is fully transmitted.
pub async fn write_frame<W>(writer: &mut W, opcode: u16, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(opcode, payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive exactly one frame, blocking until it is complete.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw).await.map_err(map_read_error)?;
    read_payload(reader, FrameHeader::from_bytes(raw)).await
}

/// Wait up to `wait` for a frame to start arriving, then read it completely.
///
/// Returns [`RecvOutcome::TimedOut`] if no byte arrived in time. Once the
/// first header byte is in, the rest of the frame is read without a deadline.
pub async fn read_frame_timeout<R>(reader: &mut R, wait: Duration) -> Result<RecvOutcome, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    let first = match tokio::time::timeout(wait, reader.read(&mut raw)).await {
        Err(_) => return Ok(RecvOutcome::TimedOut),
        Ok(result) => result?,
    };
    if first == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    reader
        .read_exact(&mut raw[first..])
        .await
        .map_err(map_read_error)?;

    let frame = read_payload(reader, FrameHeader::from_bytes(raw)).await?;
    Ok(RecvOutcome::Frame(frame))
}

async fn read_payload<R>(reader: &mut R, header: FrameHeader) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = header.payload_len()?;
    let mut payload = BytesMut::zeroed(len);
    if len > 0 {
        reader
            .read_exact(&mut payload)
            .await
            .map_err(map_read_error)?;
    }
    open_payload(header, payload)
}
