//! Chat history.
//!
//! Messages live in a fixed-capacity ring indexed by `count % capacity`,
//! where `count` is the lifetime number of messages. Readers keep a cursor
//! (the `count` they have seen up to) rather than a ring index, so a reader
//! that falls more than `capacity` behind simply loses the oldest messages.

use protocol::{truncate_utf8, MAX_CHAT_LEN, MAX_NAME_LEN};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Sender id of server announcements.
pub const SYSTEM_SENDER_ID: u32 = 0;
/// Sender name of server announcements.
pub const SYSTEM_SENDER_NAME: &str = "SYSTEM";

/// A stored chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_id: u32,
    pub sender_name: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Ring-buffered chat log with a monotonic message counter.
#[derive(Debug, Clone)]
pub struct ChatLog {
    entries: Vec<ChatMessage>,
    capacity: usize,
    count: u64,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            count: 0,
        }
    }

    /// Lifetime number of messages appended.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Append a message, overwriting the oldest once the ring is full.
    pub fn push(&mut self, sender_id: u32, sender_name: &str, text: &str) {
        let message = ChatMessage {
            sender_id,
            sender_name: truncate_utf8(sender_name, MAX_NAME_LEN - 1).to_owned(),
            text: truncate_utf8(text, MAX_CHAT_LEN - 1).to_owned(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        };
        info!("[CHAT] {}: {}", message.sender_name, message.text);

        let idx = (self.count % self.capacity as u64) as usize;
        if idx < self.entries.len() {
            self.entries[idx] = message;
        } else {
            self.entries.push(message);
        }
        self.count += 1;
    }

    /// Append a server announcement.
    pub fn announce(&mut self, text: &str) {
        self.push(SYSTEM_SENDER_ID, SYSTEM_SENDER_NAME, text);
    }

    /// Messages after `cursor`, oldest first, capped at the most recent
    /// `capacity`. The caller's new cursor is [`ChatLog::count`].
    pub fn since(&self, cursor: u64) -> Vec<ChatMessage> {
        if cursor >= self.count {
            return Vec::new();
        }
        let start = cursor.max(self.count.saturating_sub(self.capacity as u64));
        (start..self.count)
            .map(|n| self.entries[(n % self.capacity as u64) as usize].clone())
            .collect()
    }
}
