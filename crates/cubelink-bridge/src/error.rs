//! Error types for cubelink bridge operations
//!
//! Every failure in this layer is locally absorbed somewhere above: radio
//! errors degrade a single cube, malformed wire input is dropped, and nothing
//! here is fatal to the process.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Radio Errors =====
    /// No Bluetooth adapter was found on this host
    #[error("No Bluetooth adapter found")]
    AdapterNotFound,

    /// Underlying BLE stack error
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// The cube service was not resolvable on a connected peripheral
    #[error("Cube service not found on device {address:#014x}")]
    ServiceNotFound {
        /// Radio address of the peripheral
        address: u64,
    },

    /// A characteristic is not known to the link
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    // ===== Bridge Errors =====
    /// A bridge channel endpoint was dropped
    #[error("Channel closed")]
    ChannelClosed,
}

impl BridgeError {
    /// Check if this error originated in the radio stack
    ///
    /// Radio errors degrade one device and are swallowed by the caller;
    /// they never propagate across the command fan-out.
    pub fn is_radio(&self) -> bool {
        matches!(
            self,
            BridgeError::Ble(_)
                | BridgeError::ServiceNotFound { .. }
                | BridgeError::CharacteristicNotFound(_)
        )
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// Conversion from tokio mpsc send error
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BridgeError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_radio() {
        let err = BridgeError::ServiceNotFound {
            address: 0xE4_95_6E_42_8E_01,
        };
        assert!(err.is_radio());
        assert!(!BridgeError::ChannelClosed.is_radio());
    }

    #[test]
    fn test_address_formatting() {
        let err = BridgeError::ServiceNotFound {
            address: 0xE4_95_6E_42_8E_01,
        };
        assert!(err.to_string().contains("0xe4956e428e01"));
    }
}
