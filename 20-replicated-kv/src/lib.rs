//! Replicated key-value service driven by a consensus log.
//!
//! Clients talk to a [`server::KvServer`], which turns every request into a
//! log entry, waits for the log to commit it, and answers once the apply loop
//! has executed the entry. Reads go through the log too, so a successful read
//! observes every write committed before it.
//!
//! The consensus log is a collaborator behind the [`consensus::ConsensusLog`]
//! trait. [`memlog::MemLog`] is a single-node implementation used by the
//! binary and the tests.
//!
//! # Modules
//!
//! - [`command`]: commands replicated through the log
//! - [`store`]: the key-value state the log drives
//! - [`registry`]: per-index rendezvous between handlers and the apply loop
//! - [`server`]: request handlers and the apply loop
//! - [`consensus`] / [`memlog`]: the log interface and an in-memory log
//! - [`message`] / [`listener`] / [`clerk`]: JSON-line RPC over TCP
//! - [`protocol`] / [`cli`] / [`client`]: the command-line front end

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod clerk;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod consensus;
pub mod error;
pub mod listener;
pub mod memlog;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;

pub use command::{Command, OpKind, PutAppendOp};
pub use config::ServerConfig;
pub use error::KvError;
pub use server::KvServer;

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
