//! JSON wire codec for the control protocol
//!
//! Decoding fails soft: anything malformed yields `None` and the message is
//! dropped without a reply. Payload integers saturate into `[0, 255]` rather
//! than being rejected.
//!
//! Note the directional asymmetry: inbound identifiers are case-folded by
//! parsing into [`Uuid`] (lookup is on the 128-bit value), while outbound
//! identifiers render upper-case. External consumers depend on both
//! conventions, so they are preserved rather than unified.
//!
//! # Wire format
//!
//! | Direction | Frame |
//! |-----------|-------|
//! | Inbound command | `{"uuid": "<id>", "data": [<int>, ...]}` (optional `"serial"`) |
//! | Inbound discovery trigger | `{"uuid": "", "data": []}` |
//! | Outbound discovery announcement | `{"serial": <int>}` |
//! | Outbound notification | `{"serial": <int>, "uuid": "<ID-UPPERCASE>", "data": [<int>, ...]}` |

use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

/// Inbound command exactly as it appears on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    /// Sender-assigned device serial; accepted but not used for routing
    #[serde(default)]
    pub serial: Option<i64>,
    /// Target characteristic identifier
    #[serde(default)]
    pub uuid: Option<String>,
    /// Unclamped payload integers
    #[serde(default)]
    pub data: Option<Vec<i64>>,
}

/// A decoded, range-checked device command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeCommand {
    /// Target characteristic, case-folded
    pub uuid: Uuid,
    /// Payload bytes after saturating conversion
    pub payload: Vec<u8>,
}

/// Sensor notification relayed to network peers
///
/// Carries the raw notified bytes; consumers re-decode as needed, keeping
/// the wire contract decoupled from the internal sensor field layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Serial of the cube that produced the notification
    pub serial: u32,
    /// Source characteristic
    pub uuid: Uuid,
    /// Raw notification bytes
    pub payload: Vec<u8>,
}

/// Saturate a wire integer into a byte.
///
/// Out-of-range values are clamped, never rejected.
pub fn clamp_byte(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// Decode an inbound command, or `None` when the message is malformed.
///
/// Fails soft on non-object JSON, a missing/empty/unparseable `uuid`, or a
/// missing `data` array. Callers check [`is_discovery_trigger`] first; an
/// empty `uuid` never reaches device routing.
pub fn decode_command(text: &str) -> Option<CubeCommand> {
    let raw: RawCommand = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "dropping unparseable command");
            return None;
        }
    };

    let uuid_str = raw.uuid.as_deref().filter(|u| !u.is_empty())?;
    let uuid = match Uuid::parse_str(uuid_str) {
        Ok(uuid) => uuid,
        Err(e) => {
            debug!(uuid = uuid_str, error = %e, "dropping command with invalid identifier");
            return None;
        }
    };
    let data = raw.data?;

    Some(CubeCommand {
        uuid,
        payload: data.into_iter().map(clamp_byte).collect(),
    })
}

/// Recognize the discovery-trigger sentinel.
///
/// True exactly when `uuid` is present and empty and `data` is empty or
/// absent. The sentinel starts a scan instead of addressing a device.
pub fn is_discovery_trigger(text: &str) -> bool {
    let Ok(raw) = serde_json::from_str::<RawCommand>(text) else {
        return false;
    };
    matches!(raw.uuid.as_deref(), Some(""))
        && raw.data.as_deref().is_none_or(|data| data.is_empty())
}

/// Encode a notification for broadcast, identifier rendered upper-case.
pub fn encode_notification(event: &NotificationEvent) -> String {
    let mut buf = Uuid::encode_buffer();
    let uuid = event.uuid.hyphenated().encode_upper(&mut buf);
    json!({
        "serial": event.serial,
        "uuid": uuid,
        "data": event.payload,
    })
    .to_string()
}

/// Encode the one-shot announcement for a newly discovered cube.
pub fn encode_discovery_announcement(serial: u32) -> String {
    json!({ "serial": serial }).to_string()
}
