//! cubelink-server - WebSocket control server for cubelink cubes
//!
//! Binds a WebSocket endpoint, hands every inbound text frame to the cube
//! bridge, and broadcasts every bridge-produced frame to all connected
//! peers.

mod server;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cubelink_bridge::{
    AdvertisementScanner, BridgeConfigBuilder, BridgeHandle, CubeBridge, PublishCallback,
};

#[derive(Parser)]
#[command(name = "cubelink-server")]
#[command(about = "WebSocket control server for cubelink robotic cubes")]
struct Args {
    /// Listen address for the WebSocket server
    #[arg(long, default_value = "127.0.0.1:12345")]
    listen: String,

    /// Advertisement scan window in seconds
    #[arg(long, default_value_t = 3)]
    scan_seconds: u64,

    /// Welcome string sent to a newly connected peer
    #[arg(long, default_value = "cubelink")]
    welcome: String,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

/// State shared across WebSocket handlers
pub struct AppState {
    /// Handle into the running bridge
    pub bridge: BridgeHandle,
    /// Broadcast channel feeding every connected peer
    pub outbound_tx: broadcast::Sender<String>,
    /// Welcome string for new peers
    pub welcome: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = BridgeConfigBuilder::new()
        .scan_window(Duration::from_secs(args.scan_seconds))
        .welcome(args.welcome)
        .build();

    // Outbound frames fan out to every connected peer through this channel.
    let (outbound_tx, _) = broadcast::channel(config.channel_capacity);
    let publish: PublishCallback = {
        let outbound_tx = outbound_tx.clone();
        Arc::new(move |text| {
            // No peers connected is not an error; the frame is dropped.
            let _ = outbound_tx.send(text);
            Ok(())
        })
    };

    let scanner = AdvertisementScanner::new().await?;
    let (bridge, handle) = CubeBridge::new(&config, scanner, publish);

    tokio::spawn(async move {
        if let Err(e) = bridge.run().await {
            error!("Bridge error: {}", e);
        }
    });

    let state = Arc::new(AppState {
        bridge: handle,
        outbound_tx,
        welcome: config.welcome.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("WebSocket endpoint: ws://{}/", listener.local_addr()?);

    let app = server::create_router(state);
    axum::serve(listener, app).await?;

    Ok(())
}
