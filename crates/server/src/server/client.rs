//! Per-connection record owned by a worker.
//!
//! Sockets are only touched with non-blocking reads and writes. Partial
//! frames wait in the connection's buffers until the rest arrives or the
//! socket can take more, so one slow peer never stalls its worker.

use bytes::{Buf, BytesMut};
use protocol::frame::HEADER_LEN;
use protocol::{encode_frame, split_frame, Frame, ProtocolError, MAX_PAYLOAD_SIZE};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Unsent bytes a peer may fall behind by before it is dropped.
pub const WRITE_BACKLOG_LIMIT: usize = 256 * 1024;

/// Most bytes buffered from the socket at once: one largest frame.
const READ_LIMIT: usize = HEADER_LEN + MAX_PAYLOAD_SIZE as usize;

const READ_CHUNK: usize = 4096;

/// A connected client. Never shared outside its worker.
#[derive(Debug)]
pub struct Connection {
    /// Worker-local id, for logs.
    pub id: u64,
    pub addr: SocketAddr,
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    peer_closed: bool,
    /// Player slot once logged in.
    pub player_slot: Option<usize>,
    /// Last tick whose snapshot was delivered.
    pub last_tick: Option<u64>,
    /// Chat counter this connection has caught up to.
    pub chat_cursor: u64,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            peer_closed: false,
            player_slot: None,
            last_tick: None,
            chat_cursor: 0,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.player_slot.is_some()
    }

    /// Resolves once the socket has something to read (or has failed).
    pub async fn readable(&self) -> std::io::Result<()> {
        self.stream.readable().await
    }

    /// Move whatever the socket holds into the read buffer without waiting.
    ///
    /// Stops at [`READ_LIMIT`] buffered bytes; the rest stays in the socket
    /// and shows up as readable again on the next wait.
    pub fn fill(&mut self) -> Result<(), ProtocolError> {
        while !self.peer_closed && self.read_buf.len() < READ_LIMIT {
            self.read_buf.reserve(READ_CHUNK);
            match self.stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => self.peer_closed = true,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Next complete frame from the read buffer.
    ///
    /// `Ok(None)` means more bytes are needed. Frames that arrived before the
    /// peer closed are still returned; only then is the close reported.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match split_frame(&mut self.read_buf)? {
            Some(frame) => Ok(Some(frame)),
            None if self.peer_closed => Err(ProtocolError::ConnectionClosed),
            None => Ok(None),
        }
    }

    /// Queue one frame and write as much of the backlog as the socket takes.
    pub fn send(&mut self, opcode: u16, payload: &[u8]) -> Result<(), ProtocolError> {
        let bytes = encode_frame(opcode, payload)?;
        if self.write_buf.len() + bytes.len() > WRITE_BACKLOG_LIMIT {
            return Err(ProtocolError::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                "peer is not reading",
            )));
        }
        self.write_buf.extend_from_slice(&bytes);
        self.flush()
    }

    /// Write queued bytes until the socket would block.
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        while !self.write_buf.is_empty() {
            match self.stream.try_write(&self.write_buf) {
                Ok(0) => return Err(ProtocolError::ConnectionClosed),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Bytes queued but not yet accepted by the socket.
    #[cfg(test)]
    fn backlog(&self) -> usize {
        self.write_buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::read_frame;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server_side, addr) = listener.accept().await.unwrap();
        (Connection::new(0, server_side, addr), client)
    }

    async fn next(conn: &mut Connection) -> Result<Frame, ProtocolError> {
        loop {
            if let Some(frame) = conn.next_frame()? {
                return Ok(frame);
            }
            conn.readable().await?;
            conn.fill()?;
        }
    }

    #[tokio::test]
    async fn test_partial_frame_waits_in_buffer() {
        let (mut conn, mut client) = pair().await;
        let wire = encode_frame(0x0005, b"hello").unwrap();

        client.write_all(&wire[..3]).await.unwrap();
        conn.readable().await.unwrap();
        conn.fill().unwrap();
        assert_eq!(conn.next_frame().unwrap(), None);

        client.write_all(&wire[3..]).await.unwrap();
        let frame = next(&mut conn).await.unwrap();
        assert_eq!(frame.opcode, 0x0005);
        assert_eq!(&frame.payload[..], b"hello");
    }

    #[tokio::test]
    async fn test_frames_before_close_are_delivered() {
        let (mut conn, mut client) = pair().await;
        client.write_all(&encode_frame(0x0007, &[]).unwrap()).await.unwrap();
        drop(client);

        assert_eq!(next(&mut conn).await.unwrap().opcode, 0x0007);
        assert!(matches!(next(&mut conn).await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let (mut conn, mut client) = pair().await;
        conn.send(0x0011, &[]).unwrap();
        conn.send(0x0003, &[2]).unwrap();
        assert_eq!(read_frame(&mut client).await.unwrap().opcode, 0x0011);
        let frame = read_frame(&mut client).await.unwrap();
        assert_eq!((frame.opcode, &frame.payload[..]), (0x0003, &[2u8][..]));
        assert_eq!(conn.backlog(), 0);
    }

    #[tokio::test]
    async fn test_peer_that_never_reads_is_cut_off() {
        let (mut conn, _client) = pair().await;
        let payload = vec![0u8; 60_000];
        let mut result = Ok(());
        for _ in 0..1000 {
            result = conn.send(0x0004, &payload);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ProtocolError::Io(_))));
        assert!(conn.backlog() <= WRITE_BACKLOG_LIMIT);
    }
}
