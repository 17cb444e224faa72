//! Ricart–Agrawala distributed mutual exclusion over an abstract shared
//! resource (spec §4.3).
//!
//! As with `multicast.rs`, this type holds no lock of its own and does no
//! I/O; `state.rs` drives it under the shared state lock and performs the
//! REPLY/REQUEST sends afterward.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutexRequest {
    pub request_ts: i64,
    pub requester_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutexStateKind {
    Idle,
    Wanting,
    Held,
}

pub struct MutexEngine {
    state: MutexStateKind,
    request_ts: Option<i64>,
    pending_replies: u32,
    deferred: Vec<u32>,
}

impl Default for MutexEngine {
    fn default() -> Self {
        Self {
            state: MutexStateKind::Idle,
            request_ts: None,
            pending_replies: 0,
            deferred: Vec::new(),
        }
    }
}

impl MutexEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexStateKind {
        self.state
    }

    /// `request_resource` step 1: idempotent-rejects unless `Idle`. On
    /// success, transitions to `Wanting` and returns the number of peers
    /// we must now wait on.
    pub fn begin_request(&mut self, request_ts: i64, total_processes: u32) -> Option<u32> {
        if self.state != MutexStateKind::Idle {
            return None;
        }
        self.state = MutexStateKind::Wanting;
        self.request_ts = Some(request_ts);
        self.pending_replies = total_processes.saturating_sub(1);
        self.deferred.clear();
        Some(self.pending_replies)
    }

    /// `on_receive_request`: returns `true` if a REPLY should be sent
    /// immediately, `false` if the peer was appended to `deferred`.
    pub fn on_receive_request(&mut self, self_id: u32, ts: i64, from: u32) -> bool {
        let should_reply = match self.state {
            MutexStateKind::Idle => true,
            MutexStateKind::Wanting => {
                let ours = (self.request_ts.expect("wanting implies a request_ts"), self_id);
                (ts, from) < ours
            }
            MutexStateKind::Held => false,
        };
        if !should_reply {
            self.deferred.push(from);
        }
        should_reply
    }

    /// `on_receive_reply`: decrements the pending count. Returns `true`
    /// exactly once, when the count reaches zero while `Wanting` --
    /// that's the signal to wake the acquisition waiter. Replies outside
    /// `Wanting` are ignored (spec §4.3 "Replies received outside
    /// WANTING are ignored with a warning").
    pub fn on_receive_reply(&mut self) -> bool {
        if self.state != MutexStateKind::Wanting {
            return false;
        }
        self.pending_replies = self.pending_replies.saturating_sub(1);
        self.pending_replies == 0
    }

    pub fn pending_replies(&self) -> u32 {
        self.pending_replies
    }

    /// `Wanting -> Held`; `pending_replies == 0` is the precondition
    /// (spec §3 invariant).
    pub fn enter_critical_section(&mut self) {
        assert_eq!(self.pending_replies, 0, "entering with outstanding replies");
        self.state = MutexStateKind::Held;
    }

    /// `release_resource`: `Held -> Idle`, returns the deferred peers to
    /// reply to now, outside any lock.
    pub fn release(&mut self) -> Vec<u32> {
        self.state = MutexStateKind::Idle;
        self.request_ts = None;
        std::mem::take(&mut self.deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_while_not_idle_is_rejected() {
        let mut engine = MutexEngine::new();
        assert!(engine.begin_request(1, 3).is_some());
        assert!(engine.begin_request(2, 3).is_none());
    }

    #[test]
    fn lower_timestamp_wins_the_tie() {
        let mut engine = MutexEngine::new();
        engine.begin_request(10, 3); // self id doesn't matter for this helper
        assert!(engine.on_receive_request(1, 5, 2)); // 5 < 10: defer to them
        let mut engine = MutexEngine::new();
        engine.begin_request(10, 3);
        assert!(!engine.on_receive_request(1, 20, 2)); // 20 > 10: we win, they wait
    }

    #[test]
    fn same_timestamp_breaks_tie_by_process_id() {
        let mut engine = MutexEngine::new();
        engine.begin_request(10, 3);
        // self_id = 5, peer id = 2: (10, 2) < (10, 5) so we must reply.
        assert!(engine.on_receive_request(5, 10, 2));
        let mut engine = MutexEngine::new();
        engine.begin_request(10, 3);
        // self_id = 1, peer id = 2: (10, 2) > (10, 1) so peer waits.
        assert!(!engine.on_receive_request(1, 10, 2));
    }

    #[test]
    fn replies_wake_exactly_once_at_zero() {
        let mut engine = MutexEngine::new();
        engine.begin_request(1, 3);
        assert!(!engine.on_receive_reply());
        assert!(engine.on_receive_reply());
        engine.enter_critical_section();
        assert_eq!(engine.state(), MutexStateKind::Held);
    }

    #[test]
    fn reply_outside_wanting_is_ignored() {
        let mut engine = MutexEngine::new();
        assert!(!engine.on_receive_reply());
        assert_eq!(engine.state(), MutexStateKind::Idle);
    }

    #[test]
    fn release_drains_deferred_and_resets_to_idle() {
        let mut engine = MutexEngine::new();
        engine.begin_request(10, 3);
        engine.on_receive_request(1, 50, 7);
        engine.on_receive_request(1, 60, 8);
        while !engine.on_receive_reply() {}
        engine.enter_critical_section();
        let deferred = engine.release();
        assert_eq!(deferred, vec![7, 8]);
        assert_eq!(engine.state(), MutexStateKind::Idle);
    }
}
