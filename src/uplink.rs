// Remote-control uplink datagram
//
// Layout (little-endian, 20 bytes):
// [seqno:u32][axes:6 x u16][buttons:u16][pov:u8][reserved:u8]
// Axes are RC pulse widths: center 1500, +/-500 full scale.

pub const UPLINK_PACKET_LEN: usize = 20;

pub const AXIS_CENTER: u16 = 1500;
pub const AXIS_RANGE: f32 = 500.0;
pub const AXES_COUNT: usize = 6;

/// Button bit that drops the drives back to freewheel
pub const BUTTON_FREE: u16 = 1 << 0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UplinkError {
    #[error("Uplink datagram too short: {0} bytes")]
    TooShort(usize),
}

/// Stick assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Steering = 0,
    Speed = 1,
    Pan = 2,
    Tilt = 3,
    Headlight = 4,
    Aux = 5,
}

/// Hat switch position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pov {
    #[default]
    Centered,
    Up,
    Right,
    Down,
    Left,
}

impl Pov {
    fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::Up,
            2 => Self::Right,
            3 => Self::Down,
            4 => Self::Left,
            _ => Self::Centered,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::Centered => 0,
            Self::Up => 1,
            Self::Right => 2,
            Self::Down => 3,
            Self::Left => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkPacket {
    pub seqno: u32,
    pub axes: [u16; AXES_COUNT],
    pub buttons: u16,
    pub pov: Pov,
}

impl Default for UplinkPacket {
    fn default() -> Self {
        Self {
            seqno: 0,
            axes: [AXIS_CENTER; AXES_COUNT],
            buttons: 0,
            pov: Pov::Centered,
        }
    }
}

impl UplinkPacket {
    /// Parse a datagram; trailing bytes past the fixed layout are ignored
    pub fn parse(buf: &[u8]) -> Result<Self, UplinkError> {
        if buf.len() < UPLINK_PACKET_LEN {
            return Err(UplinkError::TooShort(buf.len()));
        }
        let u16_at = |offset: usize| u16::from_le_bytes([buf[offset], buf[offset + 1]]);

        let mut axes = [0u16; AXES_COUNT];
        for (i, axis) in axes.iter_mut().enumerate() {
            *axis = u16_at(4 + i * 2);
        }

        Ok(Self {
            seqno: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            axes,
            buttons: u16_at(16),
            pov: Pov::from_byte(buf[18]),
        })
    }

    pub fn encode(&self) -> [u8; UPLINK_PACKET_LEN] {
        let mut buf = [0u8; UPLINK_PACKET_LEN];
        buf[0..4].copy_from_slice(&self.seqno.to_le_bytes());
        for (i, axis) in self.axes.iter().enumerate() {
            buf[4 + i * 2..6 + i * 2].copy_from_slice(&axis.to_le_bytes());
        }
        buf[16..18].copy_from_slice(&self.buttons.to_le_bytes());
        buf[18] = self.pov.to_byte();
        buf
    }

    /// Axis deflection in [-1, 1]
    pub fn axis(&self, axis: Axis) -> f32 {
        let raw = f32::from(self.axes[axis as usize]) - f32::from(AXIS_CENTER);
        (raw / AXIS_RANGE).clamp(-1.0, 1.0)
    }

    /// Set an axis from a deflection in [-1, 1]
    pub fn set_axis(&mut self, axis: Axis, value: f32) {
        let raw = f32::from(AXIS_CENTER) + value.clamp(-1.0, 1.0) * AXIS_RANGE;
        self.axes[axis as usize] = raw.round() as u16;
    }

    pub fn free_requested(&self) -> bool {
        self.buttons & BUTTON_FREE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        let mut buf = [0u8; 24];
        buf[0..4].copy_from_slice(&7u32.to_le_bytes());
        buf[4..6].copy_from_slice(&1000u16.to_le_bytes()); // steering full left
        buf[6..8].copy_from_slice(&2000u16.to_le_bytes()); // speed full forward
        for i in 2..6 {
            buf[4 + i * 2..6 + i * 2].copy_from_slice(&1500u16.to_le_bytes());
        }
        buf[16..18].copy_from_slice(&BUTTON_FREE.to_le_bytes());
        buf[18] = 3;

        let packet = UplinkPacket::parse(&buf).unwrap();
        assert_eq!(packet.seqno, 7);
        assert_eq!(packet.axis(Axis::Steering), -1.0);
        assert_eq!(packet.axis(Axis::Speed), 1.0);
        assert_eq!(packet.axis(Axis::Pan), 0.0);
        assert!(packet.free_requested());
        assert_eq!(packet.pov, Pov::Down);
    }

    #[test]
    fn test_short_datagram() {
        assert_eq!(
            UplinkPacket::parse(&[0u8; 19]),
            Err(UplinkError::TooShort(19))
        );
    }

    #[test]
    fn test_axis_clamped() {
        let mut packet = UplinkPacket::default();
        packet.axes[Axis::Speed as usize] = 2600;
        assert_eq!(packet.axis(Axis::Speed), 1.0);
        packet.axes[Axis::Speed as usize] = 0;
        assert_eq!(packet.axis(Axis::Speed), -1.0);
    }

    #[test]
    fn test_encode_parse() {
        let mut packet = UplinkPacket {
            seqno: 42,
            pov: Pov::Left,
            ..Default::default()
        };
        packet.set_axis(Axis::Speed, 0.5);
        let parsed = UplinkPacket::parse(&packet.encode()).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.axes[Axis::Speed as usize], 1750);
    }
}
