//! Proxima demo node
//!
//! Runs one node of a UDP cluster. Without a radio driver the node is fed
//! by simulated beacons; start two or more instances pointing at each
//! other to watch them agree on the closest node.
//!
//! ```text
//! proxima-node --name kitchen --bind 127.0.0.1:7946 --peer 127.0.0.1:7947 --simulate 3
//! proxima-node --name hall    --bind 127.0.0.1:7947 --peer 127.0.0.1:7946 --simulate 3
//! ```

mod scanner;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use proxima_core::{NodeName, ProximaConfig};
use proxima_runtime::{
    init_logging, AdapterState, LogFormat, MemoryRegistry, Node, NodeConfig, Router,
};
use proxima_transport::UdpTransport;

use scanner::SimulatedRadio;

#[derive(Parser)]
#[command(name = "proxima-node")]
#[command(version, about = "BLE presence node with a UDP cluster and simulated beacons")]
struct Cli {
    /// JSON configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node name; overrides `nodeName` from the configuration.
    #[arg(short, long)]
    name: Option<String>,

    /// Local UDP address for cluster traffic.
    #[arg(short, long, default_value = "0.0.0.0:7946")]
    bind: SocketAddr,

    /// Peer node address. Repeat for several peers.
    #[arg(short, long)]
    peer: Vec<SocketAddr>,

    /// Log as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Number of simulated beacons.
    #[arg(short, long, default_value_t = 3)]
    simulate: usize,

    /// Seed for the simulated beacons.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    let mut config = match &cli.config {
        Some(path) => ProximaConfig::from_json_file(path)?,
        None => ProximaConfig::default(),
    };
    if let Some(name) = cli.name {
        config.node_name = NodeName::new(name);
    }
    config.validate()?;

    let transport = Arc::new(UdpTransport::bind(cli.bind, cli.peer).await?);
    let registry = Arc::new(MemoryRegistry::new());
    let router = Router::new(&config, registry.clone(), transport)?;

    let radio = SimulatedRadio::new(cli.simulate, cli.seed);
    let (node, handle) = Node::new(router, radio.scanner(), NodeConfig::from_config(&config))?;
    let task = tokio::spawn(node.run());
    radio.spawn(handle.clone());

    // No real adapter: report it powered on straight away
    handle.adapter_state(AdapterState::PoweredOn).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    handle.shutdown().await?;

    let node = task.await?;
    let stats = node.router().stats();
    tracing::info!(
        sightings = stats.sightings_seen,
        published = stats.events_published,
        received = stats.events_received,
        echoes = stats.echoes_ignored,
        stale = stats.events_stale,
        "node statistics"
    );
    println!("{}", serde_json::to_string_pretty(&registry.snapshot())?);

    Ok(())
}
