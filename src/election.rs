//! Bully leader election (spec §4.4).
//!
//! No crash handling: a process that starts an election assumes every
//! higher-id peer is reachable within the answer-wait timeout (spec §9
//! open question 4). As with the other engines, this type is driven
//! under the shared state lock by `state.rs`; it performs no I/O itself.

use std::collections::HashSet;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElectionRoleKind {
    Follower,
    Candidate,
    Leader,
}

pub struct ElectionEngine {
    role: ElectionRoleKind,
    current_leader: Option<u32>,
    election_in_progress: bool,
    answers_seen: HashSet<u32>,
}

impl Default for ElectionEngine {
    fn default() -> Self {
        Self {
            role: ElectionRoleKind::Follower,
            current_leader: None,
            election_in_progress: false,
            answers_seen: HashSet::new(),
        }
    }
}

pub struct TimeoutOutcome {
    pub became_leader: bool,
}

pub struct ElectionReaction {
    pub send_answer_to: Option<u32>,
    pub should_start_own_election: bool,
}

impl ElectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self) -> ElectionRoleKind {
        self.role
    }

    pub fn current_leader(&self) -> Option<u32> {
        self.current_leader
    }

    /// `start_election` guard: not `election_in_progress`. On success
    /// returns the peer ids higher than `self_id` to challenge with
    /// ELECTION; the caller sends those and arms the answer-wait timer.
    pub fn start_election(&mut self, self_id: u32, total_processes: u32) -> Option<Vec<u32>> {
        if self.election_in_progress {
            return None;
        }
        self.election_in_progress = true;
        self.role = ElectionRoleKind::Candidate;
        self.answers_seen.clear();
        Some((self_id + 1..total_processes).collect())
    }

    /// Answer-wait timer expiry. If nobody answered, we become leader
    /// and the caller broadcasts COORDINATOR; otherwise we go back to
    /// `FOLLOWER` and wait passively for one.
    pub fn on_timer_expire(&mut self, self_id: u32) -> TimeoutOutcome {
        let became_leader = self.answers_seen.is_empty();
        self.election_in_progress = false;
        if became_leader {
            self.role = ElectionRoleKind::Leader;
            self.current_leader = Some(self_id);
        } else {
            self.role = ElectionRoleKind::Follower;
        }
        TimeoutOutcome { became_leader }
    }

    /// `receive ELECTION(candidate_id)`: if we outrank the candidate we
    /// answer and, unless already mid-election, start our own.
    pub fn on_receive_election(&mut self, self_id: u32, candidate_id: u32) -> ElectionReaction {
        if self_id > candidate_id {
            ElectionReaction {
                send_answer_to: Some(candidate_id),
                should_start_own_election: !self.election_in_progress,
            }
        } else {
            ElectionReaction {
                send_answer_to: None,
                should_start_own_election: false,
            }
        }
    }

    /// `receive ANSWER(peer)`, only meaningful while `CANDIDATE`.
    pub fn on_receive_answer(&mut self, peer_id: u32) {
        if self.role == ElectionRoleKind::Candidate {
            self.answers_seen.insert(peer_id);
        }
    }

    /// `receive COORDINATOR(leader)`: unconditionally adopts the new
    /// leader and reverts to `FOLLOWER`.
    pub fn on_receive_coordinator(&mut self, leader_id: u32) {
        self.current_leader = Some(leader_id);
        self.role = ElectionRoleKind::Follower;
        self.election_in_progress = false;
    }

    #[cfg(test)]
    pub fn answers_seen(&self) -> &HashSet<u32> {
        &self.answers_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_election_challenges_only_higher_ids() {
        let mut engine = ElectionEngine::new();
        let challenged = engine.start_election(0, 3).unwrap();
        assert_eq!(challenged, vec![1, 2]);
        assert_eq!(engine.role(), ElectionRoleKind::Candidate);
    }

    #[test]
    fn re_invoking_while_in_progress_is_a_no_op() {
        let mut engine = ElectionEngine::new();
        assert!(engine.start_election(0, 3).is_some());
        assert!(engine.start_election(0, 3).is_none());
    }

    #[test]
    fn no_answers_before_timeout_declares_self_leader() {
        let mut engine = ElectionEngine::new();
        engine.start_election(2, 3);
        let outcome = engine.on_timer_expire(2);
        assert!(outcome.became_leader);
        assert_eq!(engine.role(), ElectionRoleKind::Leader);
        assert_eq!(engine.current_leader(), Some(2));
    }

    #[test]
    fn any_answer_before_timeout_yields_to_follower() {
        let mut engine = ElectionEngine::new();
        engine.start_election(0, 3);
        engine.on_receive_answer(1);
        let outcome = engine.on_timer_expire(0);
        assert!(!outcome.became_leader);
        assert_eq!(engine.role(), ElectionRoleKind::Follower);
    }

    #[test]
    fn higher_id_answers_and_starts_own_election() {
        let mut engine = ElectionEngine::new();
        let reaction = engine.on_receive_election(2, 1);
        assert_eq!(reaction.send_answer_to, Some(1));
        assert!(reaction.should_start_own_election);
    }

    #[test]
    fn lower_or_equal_id_ignores_the_challenge() {
        let mut engine = ElectionEngine::new();
        let reaction = engine.on_receive_election(0, 1);
        assert_eq!(reaction.send_answer_to, None);
        assert!(!reaction.should_start_own_election);
    }

    #[test]
    fn coordinator_message_is_adopted_unconditionally() {
        let mut engine = ElectionEngine::new();
        engine.start_election(0, 3);
        engine.on_receive_coordinator(2);
        assert_eq!(engine.current_leader(), Some(2));
        assert_eq!(engine.role(), ElectionRoleKind::Follower);
    }
}
