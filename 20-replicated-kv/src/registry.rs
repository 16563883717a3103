//! Rendezvous between request handlers and the apply loop.
//!
//! A handler learns its log index from `submit` and then waits for the apply
//! loop to reach that index. Either side may get there first, so each index
//! maps to a single slot that is created by whoever arrives first:
//!
//! - the handler stores a [`Slot::Waiting`] sender and awaits the receiver;
//! - the apply loop parks the command in a [`Slot::Committed`] slot.
//!
//! The apply loop never blocks here. A oneshot send is synchronous and a parked
//! command just sits in the map until a handler claims it or it falls out of
//! the retention window.
//!
//! The registry holds no lock of its own; the server keeps it behind the same
//! mutex as the [`KvStore`](crate::store::KvStore).

use std::collections::BTreeMap;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::command::Command;

/// Outcome of a handler asking for the agreement at an index.
#[derive(Debug)]
pub enum Agreement {
    /// The index already committed; this is the command stored there.
    Ready(Command),
    /// Not committed yet. Resolves when the apply loop signals the index, or
    /// errors if the slot is dropped (index skipped or claimed by a newer
    /// handler).
    Pending(oneshot::Receiver<Command>),
    /// The index was signalled already and nothing is left to claim.
    Missed,
}

#[derive(Debug)]
enum Slot {
    Waiting(oneshot::Sender<Command>),
    Committed(Command),
}

#[derive(Debug)]
pub struct AgreementRegistry {
    slots: BTreeMap<u64, Slot>,
    last_signaled: u64,
    retention: u64,
}

impl AgreementRegistry {
    /// Creates an empty registry that keeps unclaimed commits for `retention`
    /// indices behind the newest signal.
    pub fn new(retention: u64) -> Self {
        Self {
            slots: BTreeMap::new(),
            last_signaled: 0,
            retention,
        }
    }

    /// Get-or-create for the handler side.
    ///
    /// A committed slot is removed as it is returned. A handler that finds a
    /// waiter from an earlier submission at the same index replaces it; the
    /// earlier handler's receiver then fails, since its entry was overwritten.
    pub fn agree(&mut self, index: u64) -> Agreement {
        match self.slots.remove(&index) {
            Some(Slot::Committed(command)) => return Agreement::Ready(command),
            Some(Slot::Waiting(_superseded)) => {
                debug!(index, "replacing waiter for re-used log index");
            }
            None if index <= self.last_signaled => return Agreement::Missed,
            None => {}
        }

        let (tx, rx) = oneshot::channel();
        self.slots.insert(index, Slot::Waiting(tx));
        Agreement::Pending(rx)
    }

    /// Hands the command committed at `index` to its waiter, or parks it.
    ///
    /// Never blocks. Waiters on lower indices that the log skipped are
    /// released, and parked commits older than the retention window are
    /// dropped.
    pub fn signal(&mut self, index: u64, command: Command) {
        self.last_signaled = self.last_signaled.max(index);

        match self.slots.remove(&index) {
            Some(Slot::Waiting(tx)) => {
                if tx.send(command).is_err() {
                    trace!(index, "waiter gone before commit");
                }
            }
            Some(Slot::Committed(_)) | None => {
                self.slots.insert(index, Slot::Committed(command));
            }
        }

        self.prune(index);
    }

    /// Drops a handler's slot after it stopped waiting.
    ///
    /// Only a waiter whose receiver is gone is removed, so a newer handler
    /// waiting at the same index keeps its slot.
    pub fn abandon(&mut self, index: u64) {
        if let Some(Slot::Waiting(tx)) = self.slots.get(&index) {
            if tx.is_closed() {
                self.slots.remove(&index);
            }
        }
    }

    fn prune(&mut self, newest: u64) {
        let horizon = newest.saturating_sub(self.retention);
        self.slots.retain(|&index, slot| match slot {
            Slot::Waiting(_) => index > newest,
            Slot::Committed(_) => index == newest || index > horizon,
        });
    }

    /// Number of live slots, waiting or committed.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Highest index the apply loop has signalled.
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }
}
