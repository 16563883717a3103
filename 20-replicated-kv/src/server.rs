//! The replicated key-value server.
//!
//! Requests never touch the store directly. Every operation, reads included,
//! is submitted to the consensus log, and the handler waits for the apply
//! loop to reach the index the log assigned it:
//!
//! ```text
//! handler ──submit──▶ ConsensusLog ──commit stream──▶ apply loop
//!    ▲                                                   │
//!    └──────── AgreementRegistry (one slot per index) ◀──┘
//! ```
//!
//! The store and the registry share one `std::sync::Mutex`. It is only held
//! for map updates and never across an `.await`, so a slow or vanished
//! handler cannot stall the apply loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::command::{Command, PutAppendOp};
use crate::config::ServerConfig;
use crate::consensus::{CommitStream, ConsensusLog};
use crate::error::KvError;
use crate::lock;
use crate::registry::{Agreement, AgreementRegistry};
use crate::store::KvStore;

/// State shared by the handlers and the apply loop.
#[derive(Debug)]
struct ServiceState {
    store: KvStore,
    registry: AgreementRegistry,
    last_applied: u64,
}

impl ServiceState {
    fn new(retention: u64) -> Self {
        Self {
            store: KvStore::new(),
            registry: AgreementRegistry::new(retention),
            last_applied: 0,
        }
    }

    /// Applies one committed command and signals its index.
    ///
    /// Returns `false` for an index at or below `last_applied`; those were
    /// applied already and are ignored.
    fn apply(&mut self, index: u64, command: Command) -> bool {
        if index <= self.last_applied {
            return false;
        }
        self.store.apply(&command);
        self.last_applied = index;
        self.registry.signal(index, command);
        true
    }
}

/// Point-in-time view of a server, for status output and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub me: u64,
    pub term: u64,
    pub is_leader: bool,
    pub last_applied: u64,
    pub keys: usize,
    pub pending: usize,
}

pub struct KvServer {
    config: ServerConfig,
    log: Arc<dyn ConsensusLog>,
    state: Arc<Mutex<ServiceState>>,
    killed: AtomicBool,
}

impl KvServer {
    /// Wires a fresh store and registry to `log` and spawns the apply loop.
    ///
    /// `commits` must be the commit stream belonging to `log`. Returns without
    /// waiting for anything; must be called inside a tokio runtime.
    pub fn start(config: ServerConfig, log: Arc<dyn ConsensusLog>, commits: CommitStream) -> Self {
        let state = Arc::new(Mutex::new(ServiceState::new(config.registry_retention)));

        tokio::spawn(run_apply_loop(config.me, Arc::clone(&state), commits));
        info!(
            me = config.me,
            timeout_ms = config.agreement_timeout_ms,
            "kv server started"
        );

        Self {
            config,
            log,
            state,
            killed: AtomicBool::new(false),
        }
    }

    /// Reads `key` after every write committed before this read.
    ///
    /// A missing key reads as the empty string.
    pub async fn get(&self, key: &str) -> Result<String, KvError> {
        let index = self.replicate(Command::get(key)).await?;
        let value = lock(&self.state)
            .store
            .get(key)
            .map(str::to_owned)
            .unwrap_or_default();
        debug!(me = self.config.me, index, key, "get served");
        Ok(value)
    }

    pub async fn put_append(&self, key: &str, value: &str, op: PutAppendOp) -> Result<(), KvError> {
        let command = Command {
            key: key.to_owned(),
            value: value.to_owned(),
            kind: op.into(),
        };
        let index = self.replicate(command).await?;
        debug!(me = self.config.me, index, key, ?op, "put_append served");
        Ok(())
    }

    /// Submits `command` and waits for the log to commit it.
    ///
    /// On timeout the command is left in the log; if it commits later it is
    /// still applied.
    async fn replicate(&self, command: Command) -> Result<u64, KvError> {
        if self.is_killed() {
            return Err(KvError::WrongLeader);
        }

        let submission = self.log.submit(command.encode()?);
        if !submission.is_leader {
            return Err(KvError::WrongLeader);
        }
        let index = submission.index;

        let agreement = lock(&self.state).registry.agree(index);
        let committed = match agreement {
            Agreement::Ready(committed) => committed,
            Agreement::Missed => return Err(KvError::WrongLeader),
            Agreement::Pending(rx) => {
                // The receiver is gone once this statement ends, which lets
                // `abandon` see the slot as closed.
                let outcome = timeout(self.config.agreement_timeout(), rx).await;
                match outcome {
                    Ok(Ok(committed)) => committed,
                    Ok(Err(_)) => {
                        debug!(me = self.config.me, index, "agreement slot dropped");
                        return Err(KvError::WrongLeader);
                    }
                    Err(_) => {
                        lock(&self.state).registry.abandon(index);
                        warn!(
                            me = self.config.me,
                            index,
                            term = submission.term,
                            "agreement timed out"
                        );
                        return Err(KvError::Timeout { index });
                    }
                }
            }
        };

        if committed != command {
            debug!(me = self.config.me, index, "different command committed at index");
            return Err(KvError::WrongLeader);
        }
        Ok(index)
    }

    /// Stops the consensus log. Safe to call repeatedly.
    pub fn kill(&self) {
        if !self.killed.swap(true, Ordering::SeqCst) {
            info!(me = self.config.me, "kv server killed");
            self.log.kill();
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ServerStatus {
        let (term, is_leader) = self.log.state();
        let state = lock(&self.state);
        ServerStatus {
            me: self.config.me,
            term,
            is_leader,
            last_applied: state.last_applied,
            keys: state.store.len(),
            pending: state.registry.len(),
        }
    }

    /// Number of live agreement slots.
    pub fn registry_len(&self) -> usize {
        lock(&self.state).registry.len()
    }

    pub fn last_applied(&self) -> u64 {
        lock(&self.state).last_applied
    }

    /// Copy of the applied key-value pairs.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.state).store.snapshot()
    }
}

/// Consumes the commit stream until it closes.
///
/// The receive is the only suspension point. Entries that do not decode as a
/// [`Command`] are skipped.
async fn run_apply_loop(me: u64, state: Arc<Mutex<ServiceState>>, mut commits: CommitStream) {
    while let Some(msg) = commits.recv().await {
        let command = match Command::decode(&msg.command) {
            Ok(command) => command,
            Err(err) => {
                warn!(me, index = msg.index, error = %err, "skipping undecodable log entry");
                continue;
            }
        };

        let applied = lock(&state).apply(msg.index, command);
        if !applied {
            warn!(me, index = msg.index, "ignoring already applied index");
        }
    }
    debug!(me, "commit stream closed, apply loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_state_applies_each_index_once() {
        let mut state = ServiceState::new(16);
        assert!(state.apply(1, Command::append("k", "a")));
        assert!(!state.apply(1, Command::append("k", "a")));
        assert!(state.apply(2, Command::append("k", "b")));
        assert_eq!(state.store.get("k"), Some("ab"));
        assert_eq!(state.last_applied, 2);
    }

    #[test]
    fn service_state_rejects_stale_index() {
        let mut state = ServiceState::new(16);
        assert!(state.apply(5, Command::put("k", "new")));
        assert!(!state.apply(3, Command::put("k", "old")));
        assert_eq!(state.store.get("k"), Some("new"));
    }
}
