//! Connection workers.
//!
//! Each worker owns a private table of connections and multiplexes them on a
//! single task: it waits for any socket to become readable, a new connection
//! to be handed over, shutdown, or the poll timeout, whichever comes first.
//! After every wakeup it pushes the latest snapshot and any missed chat to
//! each logged-in client.
//!
//! Socket I/O never waits: reads take what is buffered and writes queue what
//! the socket refuses, so the only await in the loop is `Worker::wait`.

use super::client::Connection;
use super::game_state::LoginError;
use super::store::SharedStore;
use crate::chat::ChatMessage;
use crate::error::ServerError;
use bytes::Bytes;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use protocol::packets::{build_error, ChatRecv, ClientPacket, LoginRequest, LoginResponse, Opcode};
use protocol::{Direction, Frame, ProtocolError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Longest a worker sleeps without anything happening before it pushes
/// state again.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// A connection handed from the accept loop to a worker.
pub type Handoff = (TcpStream, SocketAddr);

enum Wake {
    Shutdown,
    Accepted(Handoff),
    Readable(Vec<usize>),
    Idle,
}

/// What to do with a connection after handling one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Keep,
    Close,
}

pub struct Worker {
    id: usize,
    store: SharedStore,
    inbox: mpsc::Receiver<Handoff>,
    capacity: usize,
    conns: Vec<Connection>,
    next_conn_id: u64,
    rng: StdRng,
}

impl Worker {
    pub fn new(id: usize, store: SharedStore, inbox: mpsc::Receiver<Handoff>, capacity: usize) -> Self {
        Self {
            id,
            store,
            inbox,
            capacity,
            conns: Vec::with_capacity(capacity),
            next_conn_id: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Serve connections until shutdown. Only a poisoned store is an error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        info!("Worker {} started", self.id);

        while self.store.is_running() {
            match self.wait(&mut shutdown).await {
                Wake::Shutdown => break,
                Wake::Accepted((stream, addr)) => self.adopt(stream, addr),
                Wake::Readable(ready) => {
                    let mut closed = Vec::new();
                    for idx in ready {
                        if self.service(idx)? == Flow::Close {
                            closed.push(idx);
                        }
                    }
                    self.drop_connections(closed)?;
                }
                Wake::Idle => {}
            }

            let failed = self.push_updates()?;
            self.drop_connections(failed)?;
        }

        info!("Worker {} stopped ({} connections open)", self.id, self.conns.len());
        Ok(())
    }

    async fn wait(&mut self, shutdown: &mut watch::Receiver<bool>) -> Wake {
        let mut waits: FuturesUnordered<_> = self
            .conns
            .iter()
            .enumerate()
            .map(|(idx, conn)| async move {
                // An error here resurfaces on the next read.
                let _ = conn.readable().await;
                idx
            })
            .collect();

        tokio::select! {
            _ = shutdown.changed() => Wake::Shutdown,
            handoff = self.inbox.recv() => match handoff {
                Some(handoff) => Wake::Accepted(handoff),
                None => Wake::Shutdown,
            },
            Some(first) = waits.next(), if !waits.is_empty() => {
                let mut ready = vec![first];
                while let Some(Some(idx)) = waits.next().now_or_never() {
                    ready.push(idx);
                }
                ready.sort_unstable();
                Wake::Readable(ready)
            }
            _ = tokio::time::sleep(POLL_TIMEOUT) => Wake::Idle,
        }
    }

    fn adopt(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.conns.len() >= self.capacity {
            warn!("Worker {} full, refusing connection from {}", self.id, addr);
            return;
        }
        let id = self.next_conn_id;
        self.next_conn_id += 1;
        info!("Worker {} accepted connection {} from {}", self.id, id, addr);
        self.conns.push(Connection::new(id, stream, addr));
    }

    /// Take what a readable connection has sent and handle every complete
    /// request in it.
    fn service(&mut self, idx: usize) -> Result<Flow, ServerError> {
        if let Err(e) = self.conns[idx].fill() {
            let conn = &self.conns[idx];
            debug!("Connection {} from {} closed: {}", conn.id, conn.addr, e);
            return Ok(Flow::Close);
        }

        loop {
            let frame = match self.conns[idx].next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(Flow::Keep),
                Err(e @ (ProtocolError::ChecksumMismatch { .. } | ProtocolError::PayloadTooLarge { .. })) => {
                    warn!("Dropping {} after decode failure: {}", self.conns[idx].addr, e);
                    return Ok(Flow::Close);
                }
                Err(e) => {
                    let conn = &self.conns[idx];
                    debug!("Connection {} from {} closed: {}", conn.id, conn.addr, e);
                    return Ok(Flow::Close);
                }
            };
            if self.handle_frame(idx, frame)? == Flow::Close {
                return Ok(Flow::Close);
            }
        }
    }

    fn handle_frame(&mut self, idx: usize, frame: Frame) -> Result<Flow, ServerError> {
        let packet = match ClientPacket::parse(frame.opcode, &frame.payload) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Ignoring request from {}: {}", self.conns[idx].addr, e);
                return Ok(Flow::Keep);
            }
        };

        match packet {
            ClientPacket::Login(req) => self.handle_login(idx, req),
            ClientPacket::Move { direction } => {
                self.handle_move(idx, direction)?;
                Ok(Flow::Keep)
            }
            ClientPacket::Chat { text } => {
                if let Some(slot) = self.conns[idx].player_slot {
                    self.store.with_lock(|state| state.post_chat(slot, &text))?;
                }
                Ok(Flow::Keep)
            }
            ClientPacket::Heartbeat => Ok(self.reply(idx, Opcode::HeartbeatAck, &[])),
            ClientPacket::Logout => {
                debug!("Connection {} logged out", self.conns[idx].id);
                Ok(Flow::Close)
            }
        }
    }

    fn handle_login(&mut self, idx: usize, req: LoginRequest) -> Result<Flow, ServerError> {
        if self.conns[idx].is_logged_in() {
            debug!("Ignoring repeated login from {}", self.conns[idx].addr);
            return Ok(Flow::Keep);
        }

        let rng = &mut self.rng;
        let outcome = self.store.with_lock(|state| {
            let dims = (state.grid.width() as u16, state.grid.height() as u16);
            state.login(&req.name, req.is_ai, rng).map(|grant| (grant, dims))
        })?;

        match outcome {
            Ok((grant, (grid_width, grid_height))) => {
                let conn = &mut self.conns[idx];
                conn.player_slot = Some(grant.slot);
                conn.chat_cursor = grant.chat_cursor;
                conn.last_tick = None;
                info!(
                    "{} joined as player {} (slot {}) from {}",
                    req.name, grant.player_id, grant.slot, conn.addr
                );

                let resp = LoginResponse {
                    player_id: grant.player_id,
                    color: grant.color,
                    grid_width,
                    grid_height,
                };
                Ok(self.reply(idx, Opcode::LoginResp, &resp.encode()))
            }
            Err(LoginError::ServerFull) => {
                warn!("Login from {} refused: server full", self.conns[idx].addr);
                let message = LoginError::ServerFull.to_string();
                Ok(self.reply(idx, Opcode::Error, &build_error(&message)))
            }
        }
    }

    fn handle_move(&mut self, idx: usize, direction: Direction) -> Result<(), ServerError> {
        if let Some(slot) = self.conns[idx].player_slot {
            self.store
                .with_lock(|state| state.set_pending_direction(slot, direction))?;
        }
        Ok(())
    }

    fn reply(&mut self, idx: usize, opcode: Opcode, payload: &[u8]) -> Flow {
        let conn = &mut self.conns[idx];
        match conn.send(opcode.into(), payload) {
            Ok(()) => Flow::Keep,
            Err(e) => {
                debug!("Send to {} failed: {}", conn.addr, e);
                Flow::Close
            }
        }
    }

    /// Flush queued output, then send the current snapshot to every client
    /// behind the engine and any chat they have not seen. Returns connections
    /// whose send failed.
    fn push_updates(&mut self) -> Result<Vec<usize>, ServerError> {
        let mut failed = Vec::new();
        for (idx, conn) in self.conns.iter_mut().enumerate() {
            if let Err(e) = conn.flush() {
                debug!("Flush to {} failed: {}", conn.addr, e);
                failed.push(idx);
            }
        }
        if !self.conns.iter().any(Connection::is_logged_in) {
            return Ok(failed);
        }

        let conns = &self.conns;
        let (tick, snapshot, chat, chat_count) = self.store.with_lock(|state| {
            let tick = state.tick;
            let behind = conns
                .iter()
                .any(|c| c.is_logged_in() && c.last_tick.is_none_or(|t| t < tick));
            let snapshot: Option<Bytes> = behind.then(|| state.snapshot().encode());
            let chat: Vec<Vec<ChatMessage>> = conns
                .iter()
                .map(|c| {
                    if c.is_logged_in() {
                        state.chat.since(c.chat_cursor)
                    } else {
                        Vec::new()
                    }
                })
                .collect();
            (tick, snapshot, chat, state.chat.count())
        })?;

        for (idx, (conn, missed)) in self.conns.iter_mut().zip(chat).enumerate() {
            if !conn.is_logged_in() || failed.contains(&idx) {
                continue;
            }

            if let Some(snapshot) = &snapshot {
                if conn.last_tick.is_none_or(|t| t < tick) {
                    match conn.send(Opcode::MapUpdate.into(), snapshot) {
                        Ok(()) => conn.last_tick = Some(tick),
                        Err(e) => {
                            debug!("Map update to {} failed: {}", conn.addr, e);
                            failed.push(idx);
                            continue;
                        }
                    }
                }
            }

            conn.chat_cursor = chat_count;
            for msg in missed {
                let packet = ChatRecv {
                    sender_id: msg.sender_id,
                    sender_name: msg.sender_name,
                    text: msg.text,
                };
                if let Err(e) = conn.send(Opcode::ChatRecv.into(), &packet.encode()) {
                    debug!("Chat delivery to {} failed: {}", conn.addr, e);
                    failed.push(idx);
                    break;
                }
            }
        }
        Ok(failed)
    }

    /// Close connections and release their player slots.
    fn drop_connections(&mut self, mut indices: Vec<usize>) -> Result<(), ServerError> {
        indices.sort_unstable();
        indices.dedup();
        for idx in indices.into_iter().rev() {
            let conn = self.conns.swap_remove(idx);
            if let Some(slot) = conn.player_slot {
                if let Some(name) = self.store.with_lock(|state| state.logout(slot))? {
                    info!("{} disconnected (slot {})", name, slot);
                }
            }
            debug!("Worker {} closed connection {} from {}", self.id, conn.id, conn.addr);
        }
        Ok(())
    }
}
