//! The radio resource seam
//!
//! [`GattLink`] abstracts one connected peripheral: characteristic
//! discovery, writes, reads, subscription, and the notification stream.
//! Every method awaits the underlying radio operation to completion; no
//! handles are returned for later polling. Production code uses
//! [`BlePeripheralLink`]; tests use the scriptable mock in
//! [`crate::test_utils`].

use async_trait::async_trait;
use btleplug::api::{BDAddr, CharPropFlags, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::device::{Capabilities, CharacteristicHandle};
use crate::error::{BridgeError, Result};

/// One connected GATT peripheral, as seen by a [`crate::device::Cube`]
///
/// Implementations are expected to block (in the async sense) until the
/// radio operation completes or fails; a hung radio write blocks its calling
/// task indefinitely.
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Radio address of the peripheral, stable for the link's lifetime
    fn address(&self) -> u64;

    /// Resolve the characteristics of `service`, caching the underlying
    /// radio resources for later writes/reads.
    async fn discover_characteristics(&self, service: Uuid) -> Result<Vec<CharacteristicHandle>>;

    /// Write `payload` to a characteristic, awaiting completion
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()>;

    /// Read the current value of a characteristic
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Enable notification delivery for a characteristic
    async fn subscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Stream of `(characteristic, raw bytes)` notifications for this
    /// peripheral, across all subscribed characteristics
    async fn notifications(&self) -> Result<BoxStream<'static, (Uuid, Vec<u8>)>>;
}

impl From<CharPropFlags> for Capabilities {
    fn from(flags: CharPropFlags) -> Self {
        Self {
            read: flags.contains(CharPropFlags::READ),
            write: flags
                .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
            notify: flags.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
        }
    }
}

/// Pack a 6-byte radio address into the low 48 bits of a `u64`
pub fn bdaddr_to_u64(addr: BDAddr) -> u64 {
    addr.into_inner()
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// [`GattLink`] backed by a btleplug [`Peripheral`]
///
/// The peripheral must already be connected; [`Self::discover_characteristics`]
/// performs service discovery and caches the characteristic objects so later
/// writes resolve without another radio round trip.
pub struct BlePeripheralLink {
    peripheral: Peripheral,
    address: u64,
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
}

impl BlePeripheralLink {
    /// Wrap a connected peripheral
    pub fn new(peripheral: Peripheral) -> Self {
        let address = bdaddr_to_u64(peripheral.address());
        Self {
            peripheral,
            address,
            characteristics: RwLock::new(HashMap::new()),
        }
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .unwrap()
            .get(&uuid)
            .cloned()
            .ok_or(BridgeError::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl GattLink for BlePeripheralLink {
    fn address(&self) -> u64 {
        self.address
    }

    async fn discover_characteristics(&self, service: Uuid) -> Result<Vec<CharacteristicHandle>> {
        self.peripheral.discover_services().await?;

        let mut handles = Vec::new();
        let mut cache = HashMap::new();
        for characteristic in self.peripheral.characteristics() {
            if characteristic.service_uuid != service {
                continue;
            }
            trace!(
                uuid = %characteristic.uuid,
                properties = ?characteristic.properties,
                "resolved characteristic"
            );
            handles.push(CharacteristicHandle {
                uuid: characteristic.uuid,
                capabilities: characteristic.properties.into(),
            });
            cache.insert(characteristic.uuid, characteristic);
        }

        if handles.is_empty() {
            return Err(BridgeError::ServiceNotFound {
                address: self.address,
            });
        }

        *self.characteristics.write().unwrap() = cache;
        Ok(handles)
    }

    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let target = self.characteristic(characteristic)?;
        // Prefer acknowledged writes when the characteristic offers them.
        let write_type = if target.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral.write(&target, payload, write_type).await?;
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let target = self.characteristic(characteristic)?;
        Ok(self.peripheral.read(&target).await?)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        let target = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&target).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, (Uuid, Vec<u8>)>> {
        let stream = self.peripheral.notifications().await?;
        Ok(stream.map(|n| (n.uuid, n.value)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bdaddr_packing() {
        let addr = BDAddr::from([0xE4, 0x95, 0x6E, 0x42, 0x8E, 0x01]);
        assert_eq!(bdaddr_to_u64(addr), 0xE4_95_6E_42_8E_01);
    }

    #[test]
    fn test_capabilities_from_flags() {
        let caps: Capabilities = (CharPropFlags::READ | CharPropFlags::NOTIFY).into();
        assert!(caps.read);
        assert!(!caps.write);
        assert!(caps.notify);

        let write_only: Capabilities = CharPropFlags::WRITE_WITHOUT_RESPONSE.into();
        assert!(write_only.write);
        assert!(!write_only.notify);
    }
}
