//! Totally-ordered reliable multicast: an ISIS-style holdback queue keyed
//! by Lamport timestamp plus an ACK count per message (spec §4.2).
//!
//! `MulticastEngine` itself does no I/O and takes no lock — `state.rs`
//! holds the shared state lock around calls into it and performs sends
//! afterward, per spec §5's "no network I/O under the lock" rule.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastMessage {
    pub sender_id: u32,
    pub message_id: String,
    pub origin_timestamp: i64,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub message_id: String,
    pub sender_id: u32,
}

/// A holdback queue entry, ordered by `(receive_timestamp, sender_id)`.
/// Every event handled by this process's shared clock yields a distinct
/// timestamp, so this key is unique; ties are not a case this type needs
/// to break.
struct HoldbackEntry {
    receive_timestamp: i64,
    sender_id: u32,
    message: MulticastMessage,
}

impl PartialEq for HoldbackEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.receive_timestamp, self.sender_id) == (other.receive_timestamp, other.sender_id)
    }
}
impl Eq for HoldbackEntry {}

impl PartialOrd for HoldbackEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HoldbackEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.receive_timestamp, self.sender_id).cmp(&(other.receive_timestamp, other.sender_id))
    }
}

#[derive(Default)]
pub struct MulticastEngine {
    holdback: BinaryHeap<Reverse<HoldbackEntry>>,
    ack_table: HashMap<String, u32>,
}

impl MulticastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive path step 2: push onto the holdback heap and count the
    /// receiver's own self-ack.
    pub fn enqueue(&mut self, receive_timestamp: i64, message: MulticastMessage) {
        *self.ack_table.entry(message.message_id.clone()).or_insert(0) += 1;
        self.holdback.push(Reverse(HoldbackEntry {
            receive_timestamp,
            sender_id: message.sender_id,
            message,
        }));
    }

    /// `on_receive_ack` step 2: increment the count, creating the entry
    /// with value 1 if this ACK arrived before the message itself.
    pub fn record_ack(&mut self, message_id: &str) {
        let count = self.ack_table.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            warn!("ack for {message_id} arrived before the message, table seeded with 1");
        }
    }

    /// Attempt-delivery loop: pop and deliver every head entry whose ACK
    /// count has reached `total_processes`, stopping at the first entry
    /// that hasn't — processing past a stalled head would violate total
    /// order.
    pub fn drain_deliverable(&mut self, total_processes: u32) -> Vec<MulticastMessage> {
        let mut delivered = Vec::new();
        while let Some(Reverse(head)) = self.holdback.peek() {
            let acks = self.ack_table.get(&head.message.message_id).copied().unwrap_or(0);
            if acks < total_processes {
                break;
            }
            let Reverse(entry) = self.holdback.pop().expect("peeked head must be poppable");
            self.ack_table.remove(&entry.message.message_id);
            delivered.push(entry.message);
        }
        delivered
    }

    #[cfg(test)]
    pub fn ack_count(&self, message_id: &str) -> u32 {
        self.ack_table.get(message_id).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub fn holdback_len(&self) -> usize {
        self.holdback.len()
    }
}
