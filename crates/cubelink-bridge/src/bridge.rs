//! CubeBridge, the composition root
//!
//! The bridge owns the registry and the device event channel and runs one
//! dispatch loop over two sources:
//!
//! - **Commands** from the transport (inbound wire text, stats, shutdown),
//!   delivered through a [`BridgeHandle`].
//! - **Device events** (sensor notifications and discovery announcements)
//!   produced by cube notification pumps and the scanner.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         CubeBridge                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌───────────┐     ┌──────────────┐     ┌────────────────┐  │
//! │  │ transport │────►│ dispatch     │────►│ CubeRegistry   │  │
//! │  │ (handle)  │     │ loop         │     │ fan-out writes │  │
//! │  └───────────┘     │              │     └────────────────┘  │
//! │                    │ codec        │                          │
//! │  ┌───────────┐     │              │     ┌────────────────┐  │
//! │  │ publish   │◄────│              │◄────│ device events  │  │
//! │  │ callback  │     └──────────────┘     │ (pumps, scan)  │  │
//! │  └───────────┘                          └────────────────┘  │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Outbound text leaves through an injected [`PublishCallback`], keeping
//! the socket transport outside this crate.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::codec::{self, CubeCommand};
use crate::config::BridgeConfig;
use crate::device::CubeEvent;
use crate::error::{BridgeError, Result};
use crate::registry::CubeRegistry;
use crate::scanner::DeviceScanner;

/// Callback for broadcasting outbound text to all connected peers
pub type PublishCallback = Arc<dyn Fn(String) -> std::result::Result<(), String> + Send + Sync>;

/// Commands that can be sent to the bridge
#[derive(Debug)]
pub enum BridgeCommand {
    /// Route one inbound wire message
    InboundText(String),
    /// Get bridge statistics
    GetStats(oneshot::Sender<BridgeStats>),
    /// Shut the bridge down
    Shutdown,
}

/// Bridge statistics
#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    /// Commands decoded and fanned out
    pub commands_decoded: u64,
    /// Malformed messages dropped by the codec
    pub commands_dropped: u64,
    /// Radio writes issued across all fan-outs
    pub writes_issued: u64,
    /// Fan-out targets skipped (unsupported characteristic or empty payload)
    pub writes_skipped: u64,
    /// Radio writes that failed and were swallowed
    pub write_failures: u64,
    /// Sensor notifications relayed to peers
    pub notifications_relayed: u64,
    /// Cubes discovered over the lifetime of the bridge
    pub cubes_discovered: u64,
    /// Scans started by discovery triggers
    pub scans_started: u64,
}

/// Handle for controlling a running [`CubeBridge`]
#[derive(Clone)]
pub struct BridgeHandle {
    command_tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    /// Deliver one inbound wire message for decoding and routing
    pub async fn inbound_text(&self, text: impl Into<String>) -> Result<()> {
        self.command_tx
            .send(BridgeCommand::InboundText(text.into()))
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }

    /// Get bridge statistics
    pub async fn stats(&self) -> Result<BridgeStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(BridgeCommand::GetStats(tx))
            .await
            .map_err(|_| BridgeError::ChannelClosed)?;
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    /// Shut the bridge down
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(BridgeCommand::Shutdown)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

/// Bridge service between the wire protocol and the cube registry
pub struct CubeBridge<S: DeviceScanner> {
    scanner: Arc<S>,
    registry: Arc<CubeRegistry>,
    publish: PublishCallback,
    command_rx: mpsc::Receiver<BridgeCommand>,
    events_tx: mpsc::Sender<CubeEvent>,
    events_rx: mpsc::Receiver<CubeEvent>,
    scan_window: Duration,
    stats: BridgeStats,
}

impl<S: DeviceScanner + 'static> CubeBridge<S> {
    /// Create a bridge with the given scanner and publish callback
    pub fn new(config: &BridgeConfig, scanner: S, publish: PublishCallback) -> (Self, BridgeHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.channel_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);
        let handle = BridgeHandle { command_tx };

        let bridge = Self {
            scanner: Arc::new(scanner),
            registry: Arc::new(CubeRegistry::new()),
            publish,
            command_rx,
            events_tx,
            events_rx,
            scan_window: config.scan_window,
            stats: BridgeStats::default(),
        };

        (bridge, handle)
    }

    /// The registry owned by this bridge
    pub fn registry(&self) -> Arc<CubeRegistry> {
        self.registry.clone()
    }

    /// Run the dispatch loop until shutdown
    pub async fn run(mut self) -> Result<()> {
        info!("cube bridge started");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(BridgeCommand::InboundText(text)) => self.handle_inbound(&text).await,
                        Some(BridgeCommand::GetStats(tx)) => {
                            let _ = tx.send(self.stats.clone());
                        }
                        Some(BridgeCommand::Shutdown) | None => {
                            info!("bridge shutdown requested");
                            break;
                        }
                    }
                }
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }

        info!("cube bridge stopped");
        Ok(())
    }

    /// Decode and route one inbound wire message.
    ///
    /// The discovery sentinel is checked before generic decoding so an
    /// empty identifier never reaches device routing.
    async fn handle_inbound(&mut self, text: &str) {
        if codec::is_discovery_trigger(text) {
            self.start_scan();
            return;
        }

        let Some(command) = codec::decode_command(text) else {
            self.stats.commands_dropped += 1;
            return;
        };
        self.stats.commands_decoded += 1;
        self.fan_out(&command).await;
    }

    /// Spawn one time-boxed scan.
    ///
    /// The scan suspends its own task for the whole window; the dispatch
    /// loop keeps routing commands and relaying notifications meanwhile.
    fn start_scan(&mut self) {
        self.stats.scans_started += 1;
        info!(window = ?self.scan_window, "discovery trigger received, scanning");

        let scanner = self.scanner.clone();
        let registry = self.registry.clone();
        let events = self.events_tx.clone();
        let window = self.scan_window;
        tokio::spawn(async move {
            match scanner.scan(window, registry, events).await {
                Ok(adopted) => info!(adopted, "scan finished"),
                Err(e) => warn!(error = %e, "scan failed"),
            }
        });
    }

    /// Write a decoded command to every registered cube.
    ///
    /// Iterates a snapshot taken under the registry lock; cubes appearing
    /// mid-fan-out may or may not receive the command. A cube that does not
    /// resolve the identifier is skipped silently; a radio failure is
    /// logged and swallowed without affecting the remaining cubes.
    async fn fan_out(&mut self, command: &CubeCommand) {
        let cubes = self.registry.snapshot();
        debug!(uuid = %command.uuid, cubes = cubes.len(), "fanning out command");

        for cube in cubes {
            match cube.write(command.uuid, &command.payload).await {
                Ok(true) => self.stats.writes_issued += 1,
                Ok(false) => self.stats.writes_skipped += 1,
                Err(e) => {
                    warn!(serial = cube.serial(), error = %e, "radio write failed");
                    self.stats.write_failures += 1;
                }
            }
        }
    }

    /// Encode one device event and hand it to the transport
    fn handle_event(&mut self, event: CubeEvent) {
        let text = match event {
            CubeEvent::Notification(notification) => {
                self.stats.notifications_relayed += 1;
                codec::encode_notification(&notification)
            }
            CubeEvent::Found { serial } => {
                self.stats.cubes_discovered += 1;
                info!(serial, total = self.registry.count(), "cube discovered");
                codec::encode_discovery_announcement(serial)
            }
        };

        if let Err(e) = (self.publish)(text) {
            warn!(error = %e, "outbound broadcast failed");
        }
    }
}
