//! Single-node, in-memory consensus log.
//!
//! `MemLog` satisfies the [`ConsensusLog`] contract without any replication:
//! it assigns indices, keeps entries in a `Vec`, and emits commits on the
//! commit stream in index order. By default it is the leader and commits
//! every submission right away.
//!
//! The extra knobs exist so tests and demos can reproduce what a real cluster
//! does to the service: losing leadership, stalling commits, and a new leader
//! overwriting an uncommitted entry.

use std::sync::Mutex;

use tracing::{debug, info};

use crate::consensus::{
    ApplyMsg, CommitSender, CommitStream, ConsensusLog, Submission, commit_channel,
};
use crate::lock;

#[derive(Debug)]
struct LogState {
    /// `entries[i - 1]` holds index `i`.
    entries: Vec<Vec<u8>>,
    commit_index: u64,
    term: u64,
    leader: bool,
    auto_commit: bool,
    commit_tx: Option<CommitSender>,
}

impl LogState {
    fn last_index(&self) -> u64 {
        self.entries.len() as u64
    }

    fn advance_commit(&mut self, through: u64) {
        let through = through.min(self.last_index());
        let Some(tx) = &self.commit_tx else {
            return;
        };
        while self.commit_index < through {
            self.commit_index += 1;
            let index = self.commit_index;
            let command = self.entries[(index - 1) as usize].clone();
            if tx.send(ApplyMsg { index, command }).is_err() {
                debug!(index, "commit stream receiver dropped");
                return;
            }
        }
    }
}

#[derive(Debug)]
pub struct MemLog {
    state: Mutex<LogState>,
}

impl MemLog {
    /// Creates a log that leads in term 1 and commits on submit.
    pub fn new() -> (Self, CommitStream) {
        Self::with_role(true)
    }

    /// Creates a log that rejects submissions until promoted.
    pub fn follower() -> (Self, CommitStream) {
        Self::with_role(false)
    }

    fn with_role(leader: bool) -> (Self, CommitStream) {
        let (commit_tx, commits) = commit_channel();
        let log = Self {
            state: Mutex::new(LogState {
                entries: Vec::new(),
                commit_index: 0,
                term: 1,
                leader,
                auto_commit: true,
                commit_tx: Some(commit_tx),
            }),
        };
        (log, commits)
    }

    /// Gains or loses leadership. Any change starts a new term.
    pub fn set_leader(&self, leader: bool) {
        let mut state = lock(&self.state);
        if state.leader != leader {
            state.term += 1;
            state.leader = leader;
            info!(term = state.term, leader, "memlog role changed");
        }
    }

    /// Stops committing submissions until [`release_commits`](Self::release_commits)
    /// or [`commit_through`](Self::commit_through).
    pub fn hold_commits(&self) {
        lock(&self.state).auto_commit = false;
    }

    /// Resumes committing on submit and commits everything pending.
    pub fn release_commits(&self) {
        let mut state = lock(&self.state);
        state.auto_commit = true;
        let last = state.last_index();
        state.advance_commit(last);
    }

    /// Commits every entry up to and including `index`.
    pub fn commit_through(&self, index: u64) {
        lock(&self.state).advance_commit(index);
    }

    /// Overwrites an uncommitted entry, as a newly elected leader would.
    ///
    /// Returns `false` if `index` is already committed or does not exist.
    pub fn replace_uncommitted(&self, index: u64, command: Vec<u8>) -> bool {
        let mut state = lock(&self.state);
        if index <= state.commit_index || index > state.last_index() {
            return false;
        }
        state.entries[(index - 1) as usize] = command;
        true
    }

    /// Appends an entry this node did not originate, as replication from
    /// another leader would. It is committed under the current commit mode.
    pub fn append_replicated(&self, command: Vec<u8>) -> u64 {
        let mut state = lock(&self.state);
        state.entries.push(command);
        let index = state.last_index();
        if state.auto_commit {
            state.advance_commit(index);
        }
        index
    }

    pub fn last_index(&self) -> u64 {
        lock(&self.state).last_index()
    }

    pub fn commit_index(&self) -> u64 {
        lock(&self.state).commit_index
    }
}

impl ConsensusLog for MemLog {
    fn submit(&self, command: Vec<u8>) -> Submission {
        let mut state = lock(&self.state);
        if !state.leader || state.commit_tx.is_none() {
            return Submission::rejected(state.term);
        }

        state.entries.push(command);
        let index = state.last_index();
        if state.auto_commit {
            state.advance_commit(index);
        }

        Submission {
            index,
            term: state.term,
            is_leader: true,
        }
    }

    fn state(&self) -> (u64, bool) {
        let state = lock(&self.state);
        (state.term, state.leader && state.commit_tx.is_some())
    }

    fn kill(&self) {
        let mut state = lock(&self.state);
        if state.commit_tx.take().is_some() {
            state.leader = false;
            info!(term = state.term, "memlog stopped");
        }
    }
}
