use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    error::KvError,
    message::{Request, Response, read_message, write_message},
    server::KvServer,
};

/// TCP front end exposing `Get` and `PutAppend` to clients.
///
/// Each connection gets its own task and may carry any number of requests,
/// answered in the order they arrive.
pub struct RpcListener {
    listener: TcpListener,
    server: Arc<KvServer>,
}

impl RpcListener {
    pub fn new(listener: TcpListener, server: Arc<KvServer>) -> Self {
        Self { listener, server }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let RpcListener { listener, server } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("rpc listener shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &server);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, server: &Arc<KvServer>) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, server),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, server: &Arc<KvServer>) {
    let server = Arc::clone(server);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, server).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

async fn handle_connection(stream: TcpStream, server: Arc<KvServer>) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    debug!(?peer, "client connected");
    while let Some(request) = read_message::<_, Request>(&mut reader).await? {
        let response = dispatch(&server, request).await;
        write_message(&mut writer, &response).await?;
    }
    debug!(?peer, "client disconnected");

    Ok(())
}

/// Runs one request against the server and builds the wire reply.
///
/// Every failure is reported as `wrong_leader`; the client's remedy is the
/// same for all of them.
pub async fn dispatch(server: &KvServer, request: Request) -> Response {
    match request {
        Request::Get { key } => match server.get(&key).await {
            Ok(value) => Response::Get {
                value,
                wrong_leader: false,
            },
            Err(err) => {
                log_failure(&err);
                Response::Get {
                    value: String::new(),
                    wrong_leader: true,
                }
            }
        },
        Request::PutAppend { key, value, op } => {
            let wrong_leader = match server.put_append(&key, &value, op).await {
                Ok(()) => false,
                Err(err) => {
                    log_failure(&err);
                    true
                }
            };
            Response::PutAppend { wrong_leader }
        }
    }
}

fn log_failure(err: &KvError) {
    if err.is_retryable() {
        debug!(error = %err, "request not committed");
    } else {
        warn!(error = %err, "request failed");
    }
}
