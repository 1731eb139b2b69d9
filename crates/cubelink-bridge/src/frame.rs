//! Binary frames exchanged with cube characteristics
//!
//! Two families live here:
//!
//! - **Sensor frames** notified by the cube (identity, motion/magnet, button,
//!   battery). Each is described by a declarative field layout (name, offset,
//!   width) consumed by one generic extractor, so the byte arithmetic exists
//!   in exactly one place.
//! - **Control frames** written to the cube (motor, light, sound). These are
//!   fixed-layout builders; a new control characteristic gets a new builder
//!   without touching any existing surface.
//!
//! # Sensor frame formats
//!
//! | Frame | Bytes | Layout |
//! |-------|-------|--------|
//! | Identity | 13 | position id u8, then six LE u16s (cube x/y/angle, sensor x/y/angle) |
//! | Motion | 5 | kind 0x01, level, collision, double-click, posture |
//! | Magnet | 2 | kind 0x02, status |
//! | Button | 2 | button id, state |
//! | Battery | 1 | percentage |

use bytes::{BufMut, Bytes, BytesMut};

// ============================================================================
// Declarative field layout
// ============================================================================

/// Width (and endianness) of one frame field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    /// Single byte
    U8,
    /// Little-endian 16-bit value
    U16Le,
}

/// One named field inside a fixed-layout frame
#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    offset: usize,
    width: Width,
}

impl Field {
    const fn u8(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            width: Width::U8,
        }
    }

    const fn u16_le(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            width: Width::U16Le,
        }
    }

    /// Exclusive end offset of this field
    const fn end(&self) -> usize {
        match self.width {
            Width::U8 => self.offset + 1,
            Width::U16Le => self.offset + 2,
        }
    }

    fn read(&self, data: &[u8]) -> u16 {
        match self.width {
            Width::U8 => data[self.offset] as u16,
            Width::U16Le => u16::from_le_bytes([data[self.offset], data[self.offset + 1]]),
        }
    }
}

/// Extract every field of a layout, or `None` when the frame is too short.
///
/// The single place where sensor-frame offsets meet bytes.
fn extract<const N: usize>(layout: &[Field; N], data: &[u8]) -> Option<[u16; N]> {
    let needed = layout.iter().map(Field::end).max().unwrap_or(0);
    if data.len() < needed {
        tracing::trace!(
            got = data.len(),
            needed,
            first = layout.first().map(|f| f.name),
            "short sensor frame ignored"
        );
        return None;
    }
    let mut values = [0u16; N];
    for (slot, field) in values.iter_mut().zip(layout.iter()) {
        *slot = field.read(data);
    }
    Some(values)
}

// ============================================================================
// Sensor frames
// ============================================================================

/// Sub-type discriminator for a motion report
pub const MOTION_KIND: u8 = 0x01;
/// Sub-type discriminator for a magnetic report
pub const MAGNET_KIND: u8 = 0x02;
/// Request byte that asks the cube to re-send motion information
pub const MOTION_REQUEST: u8 = 0x81;
/// Request byte that asks the cube to re-send magnetic information
pub const MAGNET_REQUEST: u8 = 0x82;

const IDENTITY_LAYOUT: [Field; 7] = [
    Field::u8("position_id", 0),
    Field::u16_le("cube_x", 1),
    Field::u16_le("cube_y", 3),
    Field::u16_le("cube_angle", 5),
    Field::u16_le("sensor_x", 7),
    Field::u16_le("sensor_y", 9),
    Field::u16_le("sensor_angle", 11),
];

const MOTION_LAYOUT: [Field; 4] = [
    Field::u8("level", 1),
    Field::u8("collision", 2),
    Field::u8("double_click", 3),
    Field::u8("posture", 4),
];

const MAGNET_LAYOUT: [Field; 1] = [Field::u8("status", 1)];

const BUTTON_LAYOUT: [Field; 2] = [Field::u8("button_id", 0), Field::u8("state", 1)];

const BATTERY_LAYOUT: [Field; 1] = [Field::u8("level", 0)];

/// Identity frame: reader coordinates reported while the cube sits on a mat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityFrame {
    /// Position id read by the optical sensor
    pub position_id: u8,
    /// X coordinate of the cube center
    pub cube_x: u16,
    /// Y coordinate of the cube center
    pub cube_y: u16,
    /// Cube orientation in degrees
    pub cube_angle: u16,
    /// X coordinate of the optical sensor
    pub sensor_x: u16,
    /// Y coordinate of the optical sensor
    pub sensor_y: u16,
    /// Optical sensor orientation in degrees
    pub sensor_angle: u16,
}

impl IdentityFrame {
    /// Parse a 13-byte identity frame
    pub fn parse(data: &[u8]) -> Option<Self> {
        let v = extract(&IDENTITY_LAYOUT, data)?;
        Some(Self {
            position_id: v[0] as u8,
            cube_x: v[1],
            cube_y: v[2],
            cube_angle: v[3],
            sensor_x: v[4],
            sensor_y: v[5],
            sensor_angle: v[6],
        })
    }
}

/// Motion report: four single-byte detection flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionFrame {
    /// Horizontal-level detection
    pub level: u8,
    /// Collision detection
    pub collision: u8,
    /// Double-click detection
    pub double_click: u8,
    /// Posture detection
    pub posture: u8,
}

/// Magnetic report: one status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagnetFrame {
    /// Magnet status
    pub status: u8,
}

/// Decoded motion-or-magnetic notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOrMagnet {
    /// Motion sub-frame (kind 0x01)
    Motion(MotionFrame),
    /// Magnetic sub-frame (kind 0x02)
    Magnet(MagnetFrame),
}

impl MotionOrMagnet {
    /// Parse a motion-or-magnetic frame by its leading discriminator.
    ///
    /// Unknown discriminators yield `None` and are ignored by callers.
    pub fn parse(data: &[u8]) -> Option<Self> {
        match data.first().copied()? {
            MOTION_KIND => {
                let v = extract(&MOTION_LAYOUT, data)?;
                Some(Self::Motion(MotionFrame {
                    level: v[0] as u8,
                    collision: v[1] as u8,
                    double_click: v[2] as u8,
                    posture: v[3] as u8,
                }))
            }
            MAGNET_KIND => {
                let v = extract(&MAGNET_LAYOUT, data)?;
                Some(Self::Magnet(MagnetFrame {
                    status: v[0] as u8,
                }))
            }
            other => {
                tracing::trace!(kind = other, "unknown sensor sub-type ignored");
                None
            }
        }
    }
}

/// Button frame: id and pressed/released state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonFrame {
    /// Button id
    pub button_id: u8,
    /// 0x80 pressed, 0x00 released
    pub state: u8,
}

impl ButtonFrame {
    /// Parse a 2-byte button frame
    pub fn parse(data: &[u8]) -> Option<Self> {
        let v = extract(&BUTTON_LAYOUT, data)?;
        Some(Self {
            button_id: v[0] as u8,
            state: v[1] as u8,
        })
    }
}

/// Battery frame: remaining capacity in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryFrame {
    /// Battery percentage (0-100)
    pub level: u8,
}

impl BatteryFrame {
    /// Parse a 1-byte battery frame
    pub fn parse(data: &[u8]) -> Option<Self> {
        let v = extract(&BATTERY_LAYOUT, data)?;
        Some(Self { level: v[0] as u8 })
    }
}

// ============================================================================
// Control frames
// ============================================================================

const MOTOR_CONTROL_TYPE: u8 = 0x01;
const MOTOR_LEFT_ID: u8 = 0x01;
const MOTOR_RIGHT_ID: u8 = 0x02;
const MOTOR_FORWARD: u8 = 0x01;
const MOTOR_BACKWARD: u8 = 0x02;

const LIGHT_ON_TYPE: u8 = 0x03;
const SOUND_EFFECT_TYPE: u8 = 0x02;

/// Build a 7-byte motor control frame.
///
/// Layout: `[0x01, left id, left direction, left speed, right id,
/// right direction, right speed]` with direction 0x01 forward / 0x02 reverse.
pub fn motor_frame(
    left_forward: bool,
    left_speed: u8,
    right_forward: bool,
    right_speed: u8,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(7);
    buf.put_u8(MOTOR_CONTROL_TYPE);
    buf.put_u8(MOTOR_LEFT_ID);
    buf.put_u8(if left_forward {
        MOTOR_FORWARD
    } else {
        MOTOR_BACKWARD
    });
    buf.put_u8(left_speed);
    buf.put_u8(MOTOR_RIGHT_ID);
    buf.put_u8(if right_forward {
        MOTOR_FORWARD
    } else {
        MOTOR_BACKWARD
    });
    buf.put_u8(right_speed);
    buf.freeze()
}

/// Build a light control frame that turns the indicator on with a color.
///
/// `duration` is in 10 ms units; zero keeps the light on until overwritten.
pub fn light_frame(duration: u8, red: u8, green: u8, blue: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(7);
    buf.put_u8(LIGHT_ON_TYPE);
    buf.put_u8(duration);
    buf.put_u8(0x01); // one light on this hardware
    buf.put_u8(0x01); // light id
    buf.put_u8(red);
    buf.put_u8(green);
    buf.put_u8(blue);
    buf.freeze()
}

/// Build a sound control frame that plays a preset effect.
pub fn sound_frame(effect_id: u8, volume: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(3);
    buf.put_u8(SOUND_EFFECT_TYPE);
    buf.put_u8(effect_id);
    buf.put_u8(volume);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_frame_layout() {
        let frame = motor_frame(true, 50, false, 80);
        assert_eq!(&frame[..], &[0x01, 0x01, 0x01, 50, 0x02, 0x02, 80]);
    }

    #[test]
    fn test_motor_frame_reverse_both() {
        let frame = motor_frame(false, 10, true, 20);
        assert_eq!(&frame[..], &[0x01, 0x01, 0x02, 10, 0x02, 0x01, 20]);
    }

    #[test]
    fn test_light_frame_layout() {
        let frame = light_frame(0, 255, 0, 128);
        assert_eq!(&frame[..], &[0x03, 0, 0x01, 0x01, 255, 0, 128]);
    }

    #[test]
    fn test_sound_frame_layout() {
        let frame = sound_frame(4, 255);
        assert_eq!(&frame[..], &[0x02, 4, 255]);
    }

    #[test]
    fn test_identity_frame_parse() {
        // position id 7, cube (258, 772), angle 90, sensor (516, 1030), angle 45
        let data = [
            7, 0x02, 0x01, 0x04, 0x03, 90, 0, 0x04, 0x02, 0x06, 0x04, 45, 0,
        ];
        let frame = IdentityFrame::parse(&data).unwrap();
        assert_eq!(frame.position_id, 7);
        assert_eq!(frame.cube_x, 0x0102);
        assert_eq!(frame.cube_y, 0x0304);
        assert_eq!(frame.cube_angle, 90);
        assert_eq!(frame.sensor_x, 0x0204);
        assert_eq!(frame.sensor_y, 0x0406);
        assert_eq!(frame.sensor_angle, 45);
    }

    #[test]
    fn test_identity_frame_too_short() {
        assert!(IdentityFrame::parse(&[7, 1, 2, 3]).is_none());
    }

    #[test]
    fn test_motion_frame_parse() {
        let frame = MotionOrMagnet::parse(&[MOTION_KIND, 1, 0, 1, 4]).unwrap();
        assert_eq!(
            frame,
            MotionOrMagnet::Motion(MotionFrame {
                level: 1,
                collision: 0,
                double_click: 1,
                posture: 4,
            })
        );
    }

    #[test]
    fn test_magnet_frame_parse() {
        let frame = MotionOrMagnet::parse(&[MAGNET_KIND, 6]).unwrap();
        assert_eq!(frame, MotionOrMagnet::Magnet(MagnetFrame { status: 6 }));
    }

    #[test]
    fn test_unknown_sub_type_ignored() {
        assert!(MotionOrMagnet::parse(&[0x7F, 1, 2, 3, 4]).is_none());
        assert!(MotionOrMagnet::parse(&[]).is_none());
    }

    #[test]
    fn test_button_frame_parse() {
        let frame = ButtonFrame::parse(&[0x01, 0x80]).unwrap();
        assert_eq!(frame.button_id, 0x01);
        assert_eq!(frame.state, 0x80);
        assert!(ButtonFrame::parse(&[0x01]).is_none());
    }

    #[test]
    fn test_battery_frame_parse() {
        assert_eq!(BatteryFrame::parse(&[87]).unwrap().level, 87);
        assert!(BatteryFrame::parse(&[]).is_none());
    }
}
