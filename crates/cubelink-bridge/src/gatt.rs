//! GATT identifiers for the cube BLE service
//!
//! These UUIDs are fixed by the cube firmware and must match exactly
//! (case-insensitively; `Uuid` equality is on the 128-bit value, so case
//! never enters into it).

use uuid::{uuid, Uuid};

/// Primary cube service advertised by every cube
pub const SERVICE: Uuid = uuid!("10b20100-5b3b-4571-9508-cf3efcd7bbae");

/// Identity information (position id + reader coordinates, notify)
pub const IDENTITY: Uuid = uuid!("10b20101-5b3b-4571-9508-cf3efcd7bbae");

/// Motor control (write)
pub const MOTOR: Uuid = uuid!("10b20102-5b3b-4571-9508-cf3efcd7bbae");

/// Light control (write)
pub const LIGHT: Uuid = uuid!("10b20103-5b3b-4571-9508-cf3efcd7bbae");

/// Sound control (write)
pub const SOUND: Uuid = uuid!("10b20104-5b3b-4571-9508-cf3efcd7bbae");

/// Motion or magnetic sensor information (notify)
pub const MOTION: Uuid = uuid!("10b20106-5b3b-4571-9508-cf3efcd7bbae");

/// Button state (notify)
pub const BUTTON: Uuid = uuid!("10b20107-5b3b-4571-9508-cf3efcd7bbae");

/// Battery level (read/notify)
pub const BATTERY: Uuid = uuid!("10b20108-5b3b-4571-9508-cf3efcd7bbae");

/// Configuration (write)
pub const CONFIGURATION: Uuid = uuid!("10b201ff-5b3b-4571-9508-cf3efcd7bbae");

/// Characteristics the bridge subscribes to on every new cube
pub const NOTIFIABLE: [Uuid; 4] = [IDENTITY, MOTION, BUTTON, BATTERY];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_matching() {
        let upper = Uuid::parse_str("10B20102-5B3B-4571-9508-CF3EFCD7BBAE").unwrap();
        let lower = Uuid::parse_str("10b20102-5b3b-4571-9508-cf3efcd7bbae").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, MOTOR);
    }

    #[test]
    fn test_notifiable_subset() {
        assert!(NOTIFIABLE.contains(&IDENTITY));
        assert!(NOTIFIABLE.contains(&BATTERY));
        assert!(!NOTIFIABLE.contains(&MOTOR));
    }
}
