//! In-memory key-value state for the replicated service.
//!
//! The store itself holds no lock. It lives inside the server's shared state
//! next to the agreement registry, and both are guarded by the same mutex.
//! Only the apply loop mutates it.

use std::collections::BTreeMap;

use crate::command::{Command, OpKind};

/// Application state that the replicated log drives.
///
/// `BTreeMap` keeps iteration order stable, which makes `STATUS`-style dumps
/// and test assertions deterministic.
#[derive(Debug, Default)]
pub struct KvStore {
    data: BTreeMap<String, String>,
}

impl KvStore {
    /// Creates an empty key-value store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, or `None` if it was never written.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Stores a key-value pair, overwriting any existing value.
    pub fn put(&mut self, key: String, value: String) {
        self.data.insert(key, value);
    }

    /// Concatenates `value` onto the current value of `key`.
    ///
    /// An absent key is treated as the empty string, so the first append
    /// behaves like a put.
    pub fn append(&mut self, key: String, value: &str) {
        self.data.entry(key).or_default().push_str(value);
    }

    /// Applies a committed command. `Get` leaves the store untouched.
    pub fn apply(&mut self, command: &Command) {
        match command.kind {
            OpKind::Put => self.put(command.key.clone(), command.value.clone()),
            OpKind::Append => self.append(command.key.clone(), &command.value),
            OpKind::Get => {}
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of all key-value pairs.
    ///
    /// Clones the map so callers never iterate while holding the server lock.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.clone()
    }
}
