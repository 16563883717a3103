//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bounded wait for a submitted command to commit.
pub const DEFAULT_AGREEMENT_TIMEOUT_MS: u64 = 1000;

/// Default number of indices an unclaimed commit stays in the registry.
pub const DEFAULT_REGISTRY_RETENTION: u64 = 1024;

/// Configuration for one replicated key-value server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// This server's position in the cluster, used in log output.
    pub me: u64,

    /// How long a handler waits for its log index before answering
    /// wrong-leader.
    pub agreement_timeout_ms: u64,

    /// Unclaimed commits older than this many indices behind the newest one
    /// are dropped from the agreement registry.
    pub registry_retention: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            me: 0,
            agreement_timeout_ms: DEFAULT_AGREEMENT_TIMEOUT_MS,
            registry_retention: DEFAULT_REGISTRY_RETENTION,
        }
    }
}

impl ServerConfig {
    pub fn new(me: u64) -> Self {
        Self {
            me,
            ..Default::default()
        }
    }

    pub fn with_agreement_timeout(mut self, timeout: Duration) -> Self {
        self.agreement_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_registry_retention(mut self, retention: u64) -> Self {
        self.registry_retention = retention;
        self
    }

    pub fn agreement_timeout(&self) -> Duration {
        Duration::from_millis(self.agreement_timeout_ms)
    }
}
