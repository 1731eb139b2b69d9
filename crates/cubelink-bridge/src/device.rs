//! One discovered cube and its characteristic table
//!
//! A [`Cube`] is created exactly once per radio address and lives for the
//! rest of the process; disconnection is not modeled (a known, accepted
//! gap). It owns its characteristic table
//! and a cache of the last decoded sensor fields; the cache is written only
//! by the cube's own notification pump.
//!
//! Command fan-out never consults the cached fields; the characteristic
//! table is the source of truth for what a cube supports.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::codec::NotificationEvent;
use crate::error::Result;
use crate::frame::{BatteryFrame, ButtonFrame, IdentityFrame, MagnetFrame, MotionFrame, MotionOrMagnet};
use crate::gatt;
use crate::link::GattLink;

/// Capability set of one characteristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Value can be read
    pub read: bool,
    /// Value can be written
    pub write: bool,
    /// Value changes can be notified
    pub notify: bool,
}

/// A resolved characteristic bound to an underlying radio resource
#[derive(Debug, Clone)]
pub struct CharacteristicHandle {
    /// Characteristic identifier
    pub uuid: Uuid,
    /// What the characteristic supports
    pub capabilities: Capabilities,
}

/// Per-cube mapping from identifier to characteristic handle
///
/// Lookup is case-insensitive by construction: keys are 128-bit [`Uuid`]
/// values, so the wire representation's case never matters.
#[derive(Debug, Default)]
pub struct CharacteristicTable {
    handles: HashMap<Uuid, CharacteristicHandle>,
}

impl CharacteristicTable {
    /// Build a table from resolved handles
    pub fn from_handles(handles: impl IntoIterator<Item = CharacteristicHandle>) -> Self {
        Self {
            handles: handles.into_iter().map(|h| (h.uuid, h)).collect(),
        }
    }

    /// Look up a characteristic.
    ///
    /// Absence is not an error: it means "this cube does not support that
    /// control" and the caller silently skips it.
    pub fn resolve(&self, uuid: Uuid) -> Option<&CharacteristicHandle> {
        self.handles.get(&uuid)
    }

    /// Iterate over the notification-capable characteristics
    pub fn notifiable(&self) -> impl Iterator<Item = &CharacteristicHandle> {
        self.handles.values().filter(|h| h.capabilities.notify)
    }

    /// Number of resolved characteristics
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when nothing resolved
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Last decoded sensor fields, written by the cube's notification pump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorState {
    /// Position id from the identity frame
    pub position_id: u8,
    /// Cube center X
    pub cube_x: u16,
    /// Cube center Y
    pub cube_y: u16,
    /// Cube angle in degrees
    pub cube_angle: u16,
    /// Optical sensor X
    pub sensor_x: u16,
    /// Optical sensor Y
    pub sensor_y: u16,
    /// Optical sensor angle in degrees
    pub sensor_angle: u16,
    /// Horizontal-level detection flag
    pub motion_level: u8,
    /// Collision detection flag
    pub motion_collision: u8,
    /// Double-click detection flag
    pub motion_double_click: u8,
    /// Posture detection value
    pub motion_posture: u8,
    /// Magnet status byte
    pub magnet_status: u8,
    /// Last reported button id
    pub button_id: u8,
    /// Last reported button state
    pub button_state: u8,
    /// Battery percentage
    pub battery: u8,
}

/// Internal event produced by cubes and the scanner, consumed by the bridge
#[derive(Debug, Clone)]
pub enum CubeEvent {
    /// A subscribed characteristic changed value
    Notification(NotificationEvent),
    /// A new cube was inserted into the registry
    Found {
        /// Serial assigned at registration
        serial: u32,
    },
}

/// One discovered cube
pub struct Cube {
    serial: u32,
    address: u64,
    link: Arc<dyn GattLink>,
    characteristics: CharacteristicTable,
    sensors: RwLock<SensorState>,
}

impl Cube {
    /// Create a cube from a resolved link and characteristic table
    pub fn new(serial: u32, link: Arc<dyn GattLink>, characteristics: CharacteristicTable) -> Self {
        Self {
            serial,
            address: link.address(),
            link,
            characteristics,
            sensors: RwLock::new(SensorState::default()),
        }
    }

    /// Serial assigned at registration
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Radio address, immutable after construction
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The cube's characteristic table
    pub fn characteristics(&self) -> &CharacteristicTable {
        &self.characteristics
    }

    /// Copy of the cached sensor fields
    pub fn sensors(&self) -> SensorState {
        *self.sensors.read().unwrap()
    }

    /// Write `payload` to a characteristic.
    ///
    /// Returns `Ok(false)` without touching the radio when the payload is
    /// empty or the identifier does not resolve on this cube. A radio
    /// failure surfaces as `Err`; the caller logs and swallows it without
    /// affecting other cubes.
    pub async fn write(&self, uuid: Uuid, payload: &[u8]) -> Result<bool> {
        if payload.is_empty() {
            return Ok(false);
        }
        let Some(handle) = self.characteristics.resolve(uuid) else {
            trace!(serial = self.serial, %uuid, "characteristic not supported, skipping");
            return Ok(false);
        };
        self.link.write(handle.uuid, payload).await?;
        Ok(true)
    }

    /// Read the battery level.
    ///
    /// Returns `0` when the battery characteristic never resolved or the
    /// read fails: "unknown", not an error.
    pub async fn read_battery(&self) -> u8 {
        if self.characteristics.resolve(gatt::BATTERY).is_none() {
            return 0;
        }
        match self.link.read(gatt::BATTERY).await {
            Ok(bytes) => {
                let level = BatteryFrame::parse(&bytes).map_or(0, |f| f.level);
                self.sensors.write().unwrap().battery = level;
                level
            }
            Err(e) => {
                warn!(serial = self.serial, error = %e, "battery read failed");
                0
            }
        }
    }

    /// Subscribe every notification-capable characteristic.
    ///
    /// A subscription failure is logged and leaves that capability
    /// permanently disabled for this cube's lifetime, with no retry.
    pub async fn subscribe_notifiable(&self) {
        for handle in self.characteristics.notifiable() {
            if let Err(e) = self.link.subscribe(handle.uuid).await {
                warn!(
                    serial = self.serial,
                    uuid = %handle.uuid,
                    error = %e,
                    "subscription failed, notifications disabled for characteristic"
                );
            }
        }
    }

    /// Start the notification pump for this cube.
    ///
    /// The spawned task consumes the link's notification stream, decodes
    /// sensor frames into the cached state, and forwards every notification
    /// as raw bytes on `events`. It holds only a weak reference back to the
    /// cube and ends when the stream or the channel closes.
    pub async fn start_notification_pump(
        self: &Arc<Self>,
        events: mpsc::Sender<CubeEvent>,
    ) -> Result<JoinHandle<()>> {
        let mut stream = self.link.notifications().await?;
        let weak = Arc::downgrade(self);
        let serial = self.serial;

        Ok(tokio::spawn(async move {
            while let Some((uuid, payload)) = stream.next().await {
                let Some(cube) = weak.upgrade() else { break };
                cube.apply_notification(uuid, &payload);

                let event = CubeEvent::Notification(NotificationEvent {
                    serial,
                    uuid,
                    payload,
                });
                if events.send(event).await.is_err() {
                    debug!(serial, "event channel closed, stopping notification pump");
                    break;
                }
            }
            trace!(serial, "notification stream ended");
        }))
    }

    /// Decode one notification into the cached sensor fields.
    ///
    /// Undecodable frames are ignored; the raw bytes still reach peers
    /// through the notification event.
    fn apply_notification(&self, uuid: Uuid, payload: &[u8]) {
        match uuid {
            u if u == gatt::IDENTITY => {
                if let Some(frame) = IdentityFrame::parse(payload) {
                    let mut sensors = self.sensors.write().unwrap();
                    sensors.position_id = frame.position_id;
                    sensors.cube_x = frame.cube_x;
                    sensors.cube_y = frame.cube_y;
                    sensors.cube_angle = frame.cube_angle;
                    sensors.sensor_x = frame.sensor_x;
                    sensors.sensor_y = frame.sensor_y;
                    sensors.sensor_angle = frame.sensor_angle;
                }
            }
            u if u == gatt::MOTION => match MotionOrMagnet::parse(payload) {
                Some(MotionOrMagnet::Motion(MotionFrame {
                    level,
                    collision,
                    double_click,
                    posture,
                })) => {
                    let mut sensors = self.sensors.write().unwrap();
                    sensors.motion_level = level;
                    sensors.motion_collision = collision;
                    sensors.motion_double_click = double_click;
                    sensors.motion_posture = posture;
                }
                Some(MotionOrMagnet::Magnet(MagnetFrame { status })) => {
                    self.sensors.write().unwrap().magnet_status = status;
                }
                None => {}
            },
            u if u == gatt::BUTTON => {
                if let Some(frame) = ButtonFrame::parse(payload) {
                    let mut sensors = self.sensors.write().unwrap();
                    sensors.button_id = frame.button_id;
                    sensors.button_state = frame.state;
                }
            }
            u if u == gatt::BATTERY => {
                if let Some(frame) = BatteryFrame::parse(payload) {
                    self.sensors.write().unwrap().battery = frame.level;
                }
            }
            other => trace!(serial = self.serial, uuid = %other, "notification on unmapped characteristic"),
        }
    }
}

impl std::fmt::Debug for Cube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cube")
            .field("serial", &self.serial)
            .field("address", &format_args!("{:#014x}", self.address))
            .field("characteristics", &self.characteristics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLink;

    fn notifying_cube(link: Arc<MockLink>) -> Arc<Cube> {
        let handles = link.handles();
        Arc::new(Cube::new(1, link, CharacteristicTable::from_handles(handles)))
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let table = CharacteristicTable::from_handles([CharacteristicHandle {
            uuid: gatt::MOTOR,
            capabilities: Capabilities {
                write: true,
                ..Default::default()
            },
        }]);
        let upper = Uuid::parse_str("10B20102-5B3B-4571-9508-CF3EFCD7BBAE").unwrap();
        let lower = Uuid::parse_str("10b20102-5b3b-4571-9508-cf3efcd7bbae").unwrap();
        assert!(table.resolve(upper).is_some());
        assert!(table.resolve(lower).is_some());
        assert!(table.resolve(gatt::SOUND).is_none());
    }

    #[tokio::test]
    async fn test_write_skips_empty_and_unresolved() {
        let link = Arc::new(MockLink::new(0x01).with_writable(gatt::MOTOR));
        let cube = notifying_cube(link.clone());

        assert!(!cube.write(gatt::MOTOR, &[]).await.unwrap());
        assert!(!cube.write(gatt::SOUND, &[1, 2]).await.unwrap());
        assert!(link.writes().is_empty());

        assert!(cube.write(gatt::MOTOR, &[1, 2, 3]).await.unwrap());
        assert_eq!(link.writes(), vec![(gatt::MOTOR, vec![1, 2, 3])]);
    }

    #[tokio::test]
    async fn test_write_propagates_radio_failure() {
        let link = Arc::new(MockLink::new(0x01).with_writable(gatt::MOTOR).failing_writes());
        let cube = notifying_cube(link);
        assert!(cube.write(gatt::MOTOR, &[1]).await.is_err());
    }

    #[tokio::test]
    async fn test_read_battery_unknown_is_zero() {
        let link = Arc::new(MockLink::new(0x01).with_writable(gatt::MOTOR));
        let cube = notifying_cube(link);
        assert_eq!(cube.read_battery().await, 0);
    }

    #[tokio::test]
    async fn test_read_battery() {
        let link = Arc::new(MockLink::new(0x01).with_readable(gatt::BATTERY, vec![87]));
        let cube = notifying_cube(link);
        assert_eq!(cube.read_battery().await, 87);
        assert_eq!(cube.sensors().battery, 87);
    }

    #[tokio::test]
    async fn test_subscription_failure_is_not_fatal() {
        let link = Arc::new(
            MockLink::new(0x01)
                .with_notifiable(gatt::BUTTON)
                .failing_subscribe(gatt::BUTTON),
        );
        let cube = notifying_cube(link.clone());
        // degrades, does not error
        cube.subscribe_notifiable().await;
        assert!(link.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_notification_pump_forwards_raw_bytes() {
        let link = Arc::new(MockLink::new(0x01).with_notifiable(gatt::BUTTON));
        let cube = notifying_cube(link.clone());
        let (tx, mut rx) = mpsc::channel(8);

        let pump = cube.start_notification_pump(tx).await.unwrap();
        link.push_notification(gatt::BUTTON, vec![0x01, 0x80]);

        match rx.recv().await.unwrap() {
            CubeEvent::Notification(event) => {
                assert_eq!(event.serial, 1);
                assert_eq!(event.uuid, gatt::BUTTON);
                assert_eq!(event.payload, vec![0x01, 0x80]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(cube.sensors().button_state, 0x80);

        link.close_notifications();
        pump.await.unwrap();
    }

    #[test]
    fn test_apply_notification_updates_cache() {
        let link = Arc::new(MockLink::new(0x01));
        let cube = Cube::new(1, link, CharacteristicTable::default());

        cube.apply_notification(
            gatt::IDENTITY,
            &[7, 0x02, 0x01, 0x04, 0x03, 90, 0, 0x04, 0x02, 0x06, 0x04, 45, 0],
        );
        let sensors = cube.sensors();
        assert_eq!(sensors.position_id, 7);
        assert_eq!(sensors.cube_x, 0x0102);
        assert_eq!(sensors.cube_angle, 90);

        cube.apply_notification(gatt::MOTION, &[0x01, 1, 1, 0, 2]);
        assert_eq!(cube.sensors().motion_collision, 1);

        cube.apply_notification(gatt::MOTION, &[0x02, 6]);
        assert_eq!(cube.sensors().magnet_status, 6);

        // unknown discriminator leaves the cache untouched
        cube.apply_notification(gatt::MOTION, &[0x7F, 9, 9, 9, 9]);
        assert_eq!(cube.sensors().motion_collision, 1);

        cube.apply_notification(gatt::BATTERY, &[44]);
        assert_eq!(cube.sensors().battery, 44);
    }
}
