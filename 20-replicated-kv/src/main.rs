use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use replicated_kv::{
    cli::{Cli, Command, ServeArgs},
    client,
    listener::RpcListener,
    memlog::MemLog,
    server::KvServer,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let (log, commits) = MemLog::new();
    let server = Arc::new(KvServer::start(args.to_config(), Arc::new(log), commits));

    let listener = RpcListener::new(TcpListener::bind(args.listen).await?, Arc::clone(&server));
    let addr = listener.local_addr()?;
    info!("kv server listening on {}", addr);

    let result = listener.run_until_ctrl_c().await;
    server.kill();
    if let Err(err) = &result {
        warn!("listener exited with error: {err:?}");
    }
    result
}
