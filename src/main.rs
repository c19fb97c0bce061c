//! chainmesh node binary.

use chainmesh::api;
use chainmesh::config::{NodeConfig, DEFAULT_HTTP_PORT, DEFAULT_P2P_PORT};
use chainmesh::node::Node;
use clap::Parser;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "chainmesh-node")]
#[command(about = "Minimal gossip-synchronised ledger node")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// HTTP control surface port
    #[arg(long, env = "HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// P2P listener port
    #[arg(long, env = "P2P_PORT", default_value_t = DEFAULT_P2P_PORT)]
    p2p_port: u16,

    /// Address both listeners bind to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Initial peers (comma-separated, e.g. "127.0.0.1:7002,10.0.0.1:7001")
    #[arg(long, env = "PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Log level, overridden by RUST_LOG
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NodeConfig::new()
        .with_http_bind_address(&args.bind)
        .with_http_port(args.http_port)
        .with_p2p_bind_address(&args.bind)
        .with_p2p_port(args.p2p_port)
        .with_initial_peers(&args.peers)?;
    config.validate()?;

    info!(
        http_port = config.http_port,
        p2p_port = config.p2p.bind_port,
        initial_peers = config.initial_peers.len(),
        "starting node"
    );

    let (mut node, handle) = Node::from_config(&config);
    let p2p_address = node.start().await?;
    info!(address = %p2p_address, "P2P listener is up");

    let http_addr: SocketAddr = format!("{}:{}", config.http_bind_address, config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(address = %http_addr, "HTTP server is listening");

    let app = api::router(handle);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server stopped");
        }
    });

    // The event loop stays on this task; it owns all chain state
    tokio::select! {
        result = node.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    Ok(())
}
