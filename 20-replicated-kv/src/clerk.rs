//! Client for a set of replicated key-value servers.
//!
//! Servers answer `wrong_leader` whenever they cannot commit a request, so
//! the clerk owns the retry policy: it starts at the last server that
//! succeeded, rotates through the rest, and backs off between full rounds.
//!
//! A retried `Append` can be applied twice if the first attempt timed out on
//! the server but committed later. Requests carry no identifiers, so nothing
//! filters such duplicates.

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, anyhow, bail, ensure};
use tokio::{io::BufReader, net::TcpStream, time::timeout};
use tracing::debug;

use crate::{
    command::PutAppendOp,
    message::{Request, Response, read_message, write_message},
};

/// Pause after every server in the list answered wrong-leader or failed.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on one request/response exchange with one server.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Clerk {
    servers: Vec<SocketAddr>,
    leader: usize,
    max_rounds: Option<usize>,
    backoff: Duration,
}

impl Clerk {
    pub fn new(servers: Vec<SocketAddr>) -> Self {
        Self {
            servers,
            leader: 0,
            max_rounds: None,
            backoff: RETRY_BACKOFF,
        }
    }

    /// Gives up after `rounds` passes over the server list.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Address of the server that answered the last successful request.
    pub fn leader(&self) -> Option<SocketAddr> {
        self.servers.get(self.leader).copied()
    }

    pub async fn get(&mut self, key: &str) -> Result<String> {
        match self.call(Request::Get { key: key.to_string() }).await? {
            Response::Get { value, .. } => Ok(value),
            other => bail!("unexpected response to get: {other:?}"),
        }
    }

    pub async fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.put_append(key, value, PutAppendOp::Put).await
    }

    pub async fn append(&mut self, key: &str, value: &str) -> Result<()> {
        self.put_append(key, value, PutAppendOp::Append).await
    }

    async fn put_append(&mut self, key: &str, value: &str, op: PutAppendOp) -> Result<()> {
        let request = Request::PutAppend {
            key: key.to_string(),
            value: value.to_string(),
            op,
        };
        match self.call(request).await? {
            Response::PutAppend { .. } => Ok(()),
            other => bail!("unexpected response to put_append: {other:?}"),
        }
    }

    async fn call(&mut self, request: Request) -> Result<Response> {
        ensure!(!self.servers.is_empty(), "clerk has no servers to contact");

        let mut rounds = 0;
        loop {
            for offset in 0..self.servers.len() {
                let candidate = (self.leader + offset) % self.servers.len();
                let addr = self.servers[candidate];
                match round_trip(addr, &request).await {
                    Ok(response) if !response.wrong_leader() => {
                        self.leader = candidate;
                        return Ok(response);
                    }
                    Ok(_) => debug!(%addr, "server is not the leader"),
                    Err(err) => debug!(%addr, error = ?err, "request failed"),
                }
            }

            rounds += 1;
            if let Some(max) = self.max_rounds {
                if rounds >= max {
                    bail!("no server accepted the request after {rounds} rounds");
                }
            }
            tokio::time::sleep(self.backoff).await;
        }
    }
}

async fn round_trip(addr: SocketAddr, request: &Request) -> Result<Response> {
    let exchange = async {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_message(&mut writer, request).await?;
        let response = read_message::<_, Response>(&mut reader)
            .await?
            .ok_or_else(|| anyhow!("{addr} closed the connection without replying"))?;
        anyhow::Ok(response)
    };

    timeout(RPC_TIMEOUT, exchange)
        .await
        .with_context(|| format!("request to {addr} timed out"))?
}
