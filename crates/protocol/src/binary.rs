//! Binary reading and writing utilities for the snakepit protocol.
//!
//! All values are big-endian. Strings are fixed-width, NUL padded fields.

use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A reader for parsing binary payloads.
///
/// Every getter fails with [`ProtocolError::UnexpectedEof`] instead of
/// panicking when the payload is shorter than its layout.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    #[inline]
    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() >= n {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedEof)
        }
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    #[inline]
    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    #[inline]
    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    /// Read `n` raw bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(n)?;
        Ok(self.buf.copy_to_bytes(n))
    }

    /// Read a fixed-width, NUL padded UTF-8 field of `width` bytes.
    ///
    /// The string ends at the first NUL; invalid UTF-8 is replaced lossily.
    pub fn get_fixed_str(&mut self, width: usize) -> Result<String, ProtocolError> {
        let raw = self.get_bytes(width)?;
        Ok(str_until_nul(&raw))
    }
}

/// Decode the bytes up to the first NUL as lossy UTF-8.
pub(crate) fn str_until_nul(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// A writer for building binary payloads.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    #[inline]
    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    /// Write a fixed-width field: at most `width - 1` bytes of `s`, NUL padded.
    pub fn put_fixed_str(&mut self, s: &str, width: usize) {
        let text = truncate_utf8(s, width.saturating_sub(1));
        self.buf.put_slice(text.as_bytes());
        self.buf.put_bytes(0, width - text.len());
    }

    /// Write raw bytes.
    pub fn put_slice(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    #[cfg(test)]
    fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
