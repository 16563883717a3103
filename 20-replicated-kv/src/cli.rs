use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_AGREEMENT_TIMEOUT_MS, DEFAULT_REGISTRY_RETENTION, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single-node key-value server backed by an in-memory log.
    Serve(ServeArgs),
    /// Connect to one or more servers and issue commands interactively.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to accept client requests on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// Position of this server in the cluster, used in log output.
    #[arg(long, default_value_t = 0)]
    pub me: u64,

    /// Milliseconds a request waits for its log entry to commit.
    #[arg(long, default_value_t = DEFAULT_AGREEMENT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Log indices an unclaimed commit is kept for.
    #[arg(long, default_value_t = DEFAULT_REGISTRY_RETENTION)]
    pub registry_retention: u64,
}

impl ServeArgs {
    pub fn to_config(&self) -> ServerConfig {
        ServerConfig::new(self.me)
            .with_agreement_timeout(Duration::from_millis(self.timeout_ms))
            .with_registry_retention(self.registry_retention)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Comma-separated server addresses. The clerk rotates through them to find the leader.
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1:5000")]
    pub server: Vec<SocketAddr>,
}
