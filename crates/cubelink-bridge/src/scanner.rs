//! Advertisement scanning and cube adoption
//!
//! A scan is deliberately time-boxed: the caller's task suspends for the
//! whole window and the listener is stopped when the window closes; there
//! is no open-ended or cancellable variant. Per advertisement the scanner
//! deduplicates by radio address against the registry, matches the
//! advertised service identifiers against the cube service, and on a match
//! runs the adoption sequence: resolve the characteristic table, subscribe
//! notifications, one bootstrap battery read, insert into the registry, and
//! only then announce the new cube. A failure at any step drops the
//! candidate silently for that window.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::device::{CharacteristicTable, Cube, CubeEvent};
use crate::error::{BridgeError, Result};
use crate::gatt;
use crate::link::{bdaddr_to_u64, BlePeripheralLink, GattLink};
use crate::registry::CubeRegistry;

/// Source of newly discovered cubes
///
/// The trait exists so the bridge can be driven by a mock in tests; the
/// production implementation is [`AdvertisementScanner`].
#[async_trait]
pub trait DeviceScanner: Send + Sync {
    /// Run one time-boxed scan, inserting every newly adopted cube into
    /// `registry` and announcing it on `events`. Returns the number of
    /// cubes adopted in this window.
    async fn scan(
        &self,
        window: Duration,
        registry: Arc<CubeRegistry>,
        events: mpsc::Sender<CubeEvent>,
    ) -> Result<usize>;
}

/// Adopt a resolved link: build the cube, subscribe, bootstrap, register,
/// announce.
///
/// Returns `Ok(None)` when the cube lost an address race and was not
/// inserted. The announcement is sent strictly after insertion, so an
/// observer calling back into the registry sees a consistent count.
pub(crate) async fn register_link(
    link: Arc<dyn GattLink>,
    registry: &CubeRegistry,
    events: &mpsc::Sender<CubeEvent>,
) -> Result<Option<u32>> {
    let handles = link.discover_characteristics(gatt::SERVICE).await?;
    let serial = registry.allocate_serial();
    let cube = Arc::new(Cube::new(
        serial,
        link,
        CharacteristicTable::from_handles(handles),
    ));

    cube.subscribe_notifiable().await;
    if let Err(e) = cube.start_notification_pump(events.clone()).await {
        // The cube still accepts writes; it just stays silent.
        warn!(serial, error = %e, "notification stream unavailable");
    }

    let battery = cube.read_battery().await;
    debug!(serial, battery, "cube bootstrap complete");

    if !registry.add(cube) {
        return Ok(None);
    }
    events.send(CubeEvent::Found { serial }).await?;
    Ok(Some(serial))
}

/// Time-boxed passive advertisement scanner over the system adapter
pub struct AdvertisementScanner {
    adapter: Adapter,
    service: Uuid,
}

impl AdvertisementScanner {
    /// Create a scanner on the first Bluetooth adapter, matching the cube
    /// service
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BridgeError::AdapterNotFound)?;
        Ok(Self {
            adapter,
            service: gatt::SERVICE,
        })
    }

    /// Override the service identifier to match against
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Process one advertisement; true when a new cube was adopted
    async fn try_adopt(
        &self,
        id: &PeripheralId,
        registry: &CubeRegistry,
        events: &mpsc::Sender<CubeEvent>,
    ) -> bool {
        let peripheral = match self.adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!(?id, error = %e, "advertisement without peripheral");
                return false;
            }
        };

        // One cube per radio address for the lifetime of the process.
        let address = bdaddr_to_u64(peripheral.address());
        if registry.contains_address(address) {
            return false;
        }

        let Ok(Some(properties)) = peripheral.properties().await else {
            return false;
        };
        if !properties.services.contains(&self.service) {
            trace!(
                address = format!("{:#014x}", address),
                "advertisement without cube service"
            );
            return false;
        }

        if let Err(e) = peripheral.connect().await {
            debug!(
                address = format!("{:#014x}", address),
                error = %e,
                "connect failed, candidate dropped"
            );
            return false;
        }

        let link = Arc::new(BlePeripheralLink::new(peripheral));
        match register_link(link, registry, events).await {
            Ok(Some(serial)) => {
                info!(
                    serial,
                    address = format!("{:#014x}", address),
                    "new cube adopted"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!(
                    address = format!("{:#014x}", address),
                    error = %e,
                    "resolution failed, candidate dropped"
                );
                false
            }
        }
    }
}

#[async_trait]
impl DeviceScanner for AdvertisementScanner {
    async fn scan(
        &self,
        window: Duration,
        registry: Arc<CubeRegistry>,
        events: mpsc::Sender<CubeEvent>,
    ) -> Result<usize> {
        let mut adverts = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        info!(window = ?window, "advertisement scan started");

        let deadline = tokio::time::Instant::now() + window;
        let mut adopted = 0;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                event = adverts.next() => {
                    let Some(event) = event else { break };
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        CentralEvent::ServicesAdvertisement { id, services } => {
                            if !services.contains(&self.service) {
                                continue;
                            }
                            id
                        }
                        _ => continue,
                    };
                    if self.try_adopt(&id, &registry, &events).await {
                        adopted += 1;
                    }
                }
            }
        }

        self.adapter.stop_scan().await?;
        info!(adopted, total = registry.count(), "advertisement scan stopped");
        Ok(adopted)
    }
}
