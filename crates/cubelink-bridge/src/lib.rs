//! Cube bridge core for the cubelink control protocol
//!
//! This crate translates between a JSON control protocol carried over a
//! message-oriented socket and the BLE GATT protocol spoken by a family of
//! small robotic cubes. Remote clients send structured commands; the bridge
//! turns them into binary characteristic writes fanned out over every
//! registered cube, and relays cube sensor notifications back as JSON.
//!
//! # Architecture
//!
//! The bridge operates in four layers:
//!
//! 1. **Wire codec** - JSON commands/notifications ↔ normalized binary
//!    frames ([`codec`], [`frame`])
//! 2. **Radio seam** - one [`link::GattLink`] per connected cube
//! 3. **Device management** - [`device::Cube`], the shared
//!    [`registry::CubeRegistry`], and the time-boxed
//!    [`scanner::AdvertisementScanner`]
//! 4. **Composition** - [`bridge::CubeBridge`], a dispatch loop joining the
//!    transport to the registry
//!
//! # Message flow
//!
//! ## Socket → cube
//!
//! 1. Transport delivers one JSON text frame
//! 2. The discovery sentinel (`{"uuid": "", "data": []}`) starts a scan
//! 3. Anything else is decoded by [`codec::decode_command`] (payload bytes
//!    saturate into `[0, 255]`)
//! 4. The command is written to every cube whose characteristic table
//!    resolves the identifier; other cubes are skipped silently
//!
//! ## Cube → socket
//!
//! 1. A subscribed characteristic notifies
//! 2. The cube's pump decodes the sensor frame into its cached state and
//!    forwards the raw bytes
//! 3. [`codec::encode_notification`] renders JSON (identifier upper-case)
//!    and the bridge broadcasts it through the injected publish callback
//!
//! # Known gaps
//!
//! A cube is never removed after link loss, no radio operation other than
//! the scan has a timeout, and nothing is retried. See DESIGN.md.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bridge;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod gatt;
pub mod link;
pub mod registry;
pub mod scanner;
pub mod test_utils;

// Re-exports for convenience
pub use bridge::{BridgeCommand, BridgeHandle, BridgeStats, CubeBridge, PublishCallback};
pub use codec::{CubeCommand, NotificationEvent, RawCommand};
pub use config::{BridgeConfig, BridgeConfigBuilder, DEFAULT_SCAN_WINDOW};
pub use device::{
    Capabilities, CharacteristicHandle, CharacteristicTable, Cube, CubeEvent, SensorState,
};
pub use error::{BridgeError, Result};
pub use link::{BlePeripheralLink, GattLink};
pub use registry::CubeRegistry;
pub use scanner::{AdvertisementScanner, DeviceScanner};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_scan_window() {
        assert_eq!(DEFAULT_SCAN_WINDOW.as_secs(), 3);
    }
}
