//! Interface to the consensus log that orders and commits commands.
//!
//! The log is a collaborator: leader election, replication and persistence
//! all happen behind [`ConsensusLog`]. The server only submits encoded
//! commands and consumes the commit stream.

use tokio::sync::mpsc;

/// Result of handing a command to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Index the command will occupy if it commits. Meaningless when
    /// `is_leader` is false.
    pub index: u64,
    pub term: u64,
    pub is_leader: bool,
}

impl Submission {
    pub fn rejected(term: u64) -> Self {
        Self {
            index: 0,
            term,
            is_leader: false,
        }
    }
}

/// A committed entry delivered on the commit stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyMsg {
    pub index: u64,
    pub command: Vec<u8>,
}

/// Sending half of the commit stream, held by the log.
pub type CommitSender = mpsc::UnboundedSender<ApplyMsg>;

/// Receiving half of the commit stream, consumed by the apply loop.
///
/// Entries arrive in increasing index order, each committed index once.
pub type CommitStream = mpsc::UnboundedReceiver<ApplyMsg>;

/// Creates a commit stream pair.
pub fn commit_channel() -> (CommitSender, CommitStream) {
    mpsc::unbounded_channel()
}

/// A replicated, totally ordered log of opaque commands.
pub trait ConsensusLog: Send + Sync {
    /// Appends `command` if this node leads. Returns immediately; the entry
    /// shows up on the commit stream once it commits.
    fn submit(&self, command: Vec<u8>) -> Submission;

    /// Current `(term, is_leader)`.
    fn state(&self) -> (u64, bool);

    /// Stops the log. Calling it more than once has no further effect.
    fn kill(&self);
}
