mod api;
mod constants;
mod peer;

use api::{router, AppState};
use clap::Parser;
use constants::{DEFAULT_LISTEN, DEFAULT_PEER_TIMEOUT_SECS, NODE_ID_BYTES};
use peer::{normalize_peer, HttpPeerFetcher};
use rand::RngCore;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(short, long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Identity credited with mining rewards (random when omitted)
    #[arg(long)]
    node_id: Option<String>,

    /// Per-peer timeout when fetching chains during conflict resolution
    #[arg(long, default_value_t = DEFAULT_PEER_TIMEOUT_SECS)]
    peer_timeout_secs: u64,

    /// Peers to register at startup (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,
}

fn random_node_id() -> String {
    let mut bytes = [0u8; NODE_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let node_id = args.node_id.unwrap_or_else(random_node_id);
    let fetcher = HttpPeerFetcher::new(Duration::from_secs(args.peer_timeout_secs))?;
    let state = AppState::new(node_id.as_str(), Arc::new(fetcher));
    {
        let mut peers = state.peers.write();
        for address in &args.peers {
            peers.insert(normalize_peer(address)?);
        }
    }

    let app = router(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!(%node_id, "ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
