// Drive controller CAN protocol (the subset this rover uses)
//
// All multi-byte fields on the wire are big-endian two's complement.
// Frame layout: extended id [command:8][node:8], payload up to 8 bytes.

use crate::can::CanFrame;

/// Command tags of the drive controller protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetDuty = 0,
    SetCurrent = 1,
    Status = 9,
    Status2 = 14,
    Status3 = 15,
    Status4 = 16,
    Ping = 17,
    Pong = 18,
    Status5 = 27,
}

impl Command {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::SetDuty),
            1 => Some(Self::SetCurrent),
            9 => Some(Self::Status),
            14 => Some(Self::Status2),
            15 => Some(Self::Status3),
            16 => Some(Self::Status4),
            17 => Some(Self::Ping),
            18 => Some(Self::Pong),
            27 => Some(Self::Status5),
            _ => None,
        }
    }
}

/// Duty command scale: 1.0 == 100000
pub const DUTY_COMMAND_SCALE: f32 = 100_000.0;

/// Current command scale: 1 A == 1000
pub const CURRENT_COMMAND_SCALE: f32 = 1_000.0;

/// Wire word the controller sends for "no reading"
const NO_READING: u16 = 0x0080;

/// Spurious bit the controller sets in the STATUS_5 input voltage word
const VOLTAGE_MASK: u16 = 0xFF7F;

/// Decode a 16-bit wire word.
///
/// `raw` is the word exactly as it sits in the payload, first byte in the low
/// bits (what a little-endian load of the two bytes gives). The value itself is
/// big-endian, so this is a byte swap plus reinterpret, independent of host.
///
/// The controller reports `0x0080` (0x8000 big-endian) when a reading is not
/// available; that decodes as 0 rather than -32768.
pub fn decode_i16(raw: u16) -> i16 {
    if raw == NO_READING {
        return 0;
    }
    i16::from_be_bytes(raw.to_le_bytes())
}

/// Decode a 32-bit wire word, same conventions as [`decode_i16`]
pub fn decode_i32(raw: u32) -> i32 {
    i32::from_be_bytes(raw.to_le_bytes())
}

/// Decode a 16-bit fixed-point wire word
pub fn decode_fixed(raw: u16, divisor: f64) -> f64 {
    f64::from(decode_i16(raw)) / divisor
}

pub fn encode_i32(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Load the wire word at `offset`, `None` if it runs past the payload
fn word16(payload: &[u8], offset: usize) -> Option<u16> {
    let bytes = payload.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn word32(payload: &[u8], offset: usize) -> Option<u32> {
    let bytes = payload.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_i16(payload: &[u8], offset: usize) -> Option<i16> {
    word16(payload, offset).map(decode_i16)
}

fn read_i32(payload: &[u8], offset: usize) -> Option<i32> {
    word32(payload, offset).map(decode_i32)
}

/// Periodic status records broadcast by every drive controller.
///
/// Field suffixes give the fixed-point scale of the raw value:
/// `x10` tenths, `x50` fiftieths, `x10000` ten-thousandths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusRecord {
    /// STATUS: rpm i32, current x10 i16, duty i16 (scale set by firmware dialect)
    Status { rpm: i32, current_x10: i16, duty: i16 },
    /// STATUS_2: amp-hours consumed/charged, x10000 i32
    Status2 { ah_x10000: i32, ah_charged_x10000: i32 },
    /// STATUS_3: watt-hours consumed/charged, x10000 i32
    Status3 { wh_x10000: i32, wh_charged_x10000: i32 },
    /// STATUS_4: fet temp x10, motor temp x10, input current x10, pid position x50
    Status4 {
        temp_fet_x10: i16,
        temp_motor_x10: i16,
        current_in_x10: i16,
        pid_pos_x50: i16,
    },
    /// STATUS_5: tachometer i32, input voltage x10 i16
    Status5 { tacho: i32, v_in_x10: i16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Short {command:?} payload: need {needed} bytes, got {got}")]
pub struct ShortPayload {
    pub command: Command,
    pub needed: usize,
    pub got: usize,
}

impl StatusRecord {
    /// Decode a status payload. `Ok(None)` for tags that are not status records.
    pub fn decode(tag: u8, payload: &[u8]) -> Result<Option<Self>, ShortPayload> {
        let Some(command) = Command::from_tag(tag) else {
            return Ok(None);
        };
        let needed = match command {
            Command::Status | Command::Status2 | Command::Status3 | Command::Status4 => 8,
            Command::Status5 => 6,
            _ => return Ok(None),
        };
        let short = ShortPayload {
            command,
            needed,
            got: payload.len(),
        };
        Self::decode_fields(command, payload)
            .map(Some)
            .ok_or(short)
    }

    pub fn command(&self) -> Command {
        match self {
            Self::Status { .. } => Command::Status,
            Self::Status2 { .. } => Command::Status2,
            Self::Status3 { .. } => Command::Status3,
            Self::Status4 { .. } => Command::Status4,
            Self::Status5 { .. } => Command::Status5,
        }
    }

    fn decode_fields(command: Command, p: &[u8]) -> Option<Self> {
        let record = match command {
            Command::Status => Self::Status {
                rpm: read_i32(p, 0)?,
                current_x10: read_i16(p, 4)?,
                duty: read_i16(p, 6)?,
            },
            Command::Status2 => Self::Status2 {
                ah_x10000: read_i32(p, 0)?,
                ah_charged_x10000: read_i32(p, 4)?,
            },
            Command::Status3 => Self::Status3 {
                wh_x10000: read_i32(p, 0)?,
                wh_charged_x10000: read_i32(p, 4)?,
            },
            Command::Status4 => Self::Status4 {
                temp_fet_x10: read_i16(p, 0)?,
                temp_motor_x10: read_i16(p, 2)?,
                current_in_x10: read_i16(p, 4)?,
                pid_pos_x50: read_i16(p, 6)?,
            },
            Command::Status5 => Self::Status5 {
                tacho: read_i32(p, 0)?,
                v_in_x10: decode_i16(word16(p, 4)? & VOLTAGE_MASK),
            },
            _ => return None,
        };
        Some(record)
    }
}

fn frame(id: u8, command: Command, payload: &[u8]) -> CanFrame {
    CanFrame::fitted(id, command as u8, payload)
}

/// SET_DUTY: duty in [-1, 1], sent as i32 x100000
pub fn set_duty(id: u8, duty: f32) -> CanFrame {
    let duty = duty.clamp(-1.0, 1.0);
    let raw = (duty * DUTY_COMMAND_SCALE) as i32;
    frame(id, Command::SetDuty, &encode_i32(raw))
}

/// SET_CURRENT in amps; zero lets the motor freewheel
pub fn set_current(id: u8, amps: f32) -> CanFrame {
    let raw = (amps * CURRENT_COMMAND_SCALE) as i32;
    frame(id, Command::SetCurrent, &encode_i32(raw))
}

/// PING carrying the id the PONG should be addressed to
pub fn ping(id: u8, sender: u8) -> CanFrame {
    frame(id, Command::Ping, &[sender])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wire word for a big-endian i16, as it sits in the payload
    fn wire16(value: i16) -> u16 {
        u16::from_le_bytes(value.to_be_bytes())
    }

    #[test]
    fn test_i32_round_trip() {
        for x in [0, 1, -1, 3000, -3000, i32::MAX, i32::MIN, 0x1234_5678] {
            assert_eq!(decode_i32(u32::from_le_bytes(encode_i32(x))), x);
        }
    }

    #[test]
    fn test_i16_round_trip() {
        // i16::MIN is the controller's "no reading" marker
        for x in (i16::MIN + 1)..=i16::MAX {
            assert_eq!(decode_i16(wire16(x)), x);
        }
        assert_eq!(decode_i16(wire16(i16::MIN)), 0);
        assert_eq!(decode_i16(0x0080), 0);
    }

    #[test]
    fn test_decode_is_big_endian() {
        // Bytes [0x0B, 0xB8] on the wire
        assert_eq!(decode_i16(u16::from_le_bytes([0x0B, 0xB8])), 3000);
        assert_eq!(decode_i32(u32::from_le_bytes([0xFF, 0xFF, 0xFF, 0xFE])), -2);
        assert_eq!(encode_i32(3000), [0x00, 0x00, 0x0B, 0xB8]);
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(decode_fixed(wire16(12345), 10.0), 1234.5);
        assert_eq!(decode_fixed(wire16(-250), 50.0), -5.0);
    }

    #[test]
    fn test_status_decode() {
        let payload = [0x00, 0x00, 0x0B, 0xB8, 0x00, 0x64, 0x03, 0xE8];
        let record = StatusRecord::decode(9, &payload).unwrap().unwrap();
        assert_eq!(
            record,
            StatusRecord::Status {
                rpm: 3000,
                current_x10: 100,
                duty: 1000
            }
        );
    }

    #[test]
    fn test_status5_voltage_mask() {
        // 0x80 set in the voltage high byte is a firmware artifact
        let payload = [0x00, 0x00, 0x00, 0x10, 0x81, 0xF4, 0x00, 0x00];
        let record = StatusRecord::decode(27, &payload).unwrap().unwrap();
        assert_eq!(
            record,
            StatusRecord::Status5 {
                tacho: 16,
                v_in_x10: 500
            }
        );
    }

    #[test]
    fn test_short_payload_rejected() {
        let err = StatusRecord::decode(16, &[0, 1, 0, 2]).unwrap_err();
        assert_eq!(err.needed, 8);
        assert_eq!(err.got, 4);
    }

    #[test]
    fn test_non_status_tags() {
        assert_eq!(StatusRecord::decode(18, &[]), Ok(None));
        assert_eq!(StatusRecord::decode(0xFF, &[0; 8]), Ok(None));
    }

    #[test]
    fn test_set_duty_encoding() {
        let frame = set_duty(3, 0.5);
        assert_eq!(frame.actuator_id, 3);
        assert_eq!(frame.command, Command::SetDuty as u8);
        assert_eq!(frame.payload(), &encode_i32(50_000));

        // Clamped to full scale
        assert_eq!(set_duty(0, -2.0).payload(), &encode_i32(-100_000));
    }

    #[test]
    fn test_freewheel_and_ping() {
        assert_eq!(set_current(2, 0.0).payload(), &[0, 0, 0, 0]);
        let ping = ping(4, 0xFE);
        assert_eq!(ping.command, 17);
        assert_eq!(ping.payload(), &[0xFE]);
    }
}
