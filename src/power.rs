// Power-control datagrams from the ground station
//
// Layout (little-endian, 88 bytes):
// [magic:u64][cmd:u64][payload:8 x u64][pad:3 x u16][crc:u16]
// crc is CRC-16/XMODEM over everything before it.
//
// The runtime only turns requests into events; actually rebooting is up to the supervisor.

use std::time::{Duration, Instant};

use crc16::{State, XMODEM};

use crate::messages::PowerEvent;

pub const POWER_MAGIC: u64 = 0x5243_5f50_4f57_4552; // "RC_POWER"

pub const CMD_CONNECT: u64 = 0x4443_4f4e_4e45_4354;
pub const CMD_REBOOT: u64 = 0x4452_5245_424f_4f54;
pub const CMD_SHUTDOWN: u64 = 0x4452_5348_5554_444e;
pub const CMD_KEEPALIVE: u64 = 0x4b50_5f41_4c49_5645;

pub const POWER_PACKET_LEN: usize = 88;
const CRC_OFFSET: usize = POWER_PACKET_LEN - 2;

/// How often to announce ourselves until the ground station answers
pub const CONNECT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PowerError {
    #[error("Power packet too short: {0} bytes")]
    TooShort(usize),

    #[error("Power packet CRC mismatch: expected 0x{expected:04X}, got 0x{got:04X}")]
    Crc { expected: u16, got: u16 },

    #[error("Power packet has wrong magic 0x{0:016X}")]
    Magic(u64),
}

/// What to do with one valid power packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Event(PowerEvent),
    /// Send the packet back unchanged
    Echo,
    Ignore,
}

fn crc(data: &[u8]) -> u16 {
    State::<XMODEM>::calculate(data)
}

/// Build a packet carrying `cmd` with an empty payload
pub fn build_packet(cmd: u64) -> [u8; POWER_PACKET_LEN] {
    let mut buf = [0u8; POWER_PACKET_LEN];
    buf[0..8].copy_from_slice(&POWER_MAGIC.to_le_bytes());
    buf[8..16].copy_from_slice(&cmd.to_le_bytes());
    let crc = crc(&buf[..CRC_OFFSET]);
    buf[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Validate a packet and return its command word
pub fn parse_packet(buf: &[u8]) -> Result<u64, PowerError> {
    if buf.len() < POWER_PACKET_LEN {
        return Err(PowerError::TooShort(buf.len()));
    }
    let expected = crc(&buf[..CRC_OFFSET]);
    let got = u16::from_le_bytes([buf[CRC_OFFSET], buf[CRC_OFFSET + 1]]);
    if expected != got {
        return Err(PowerError::Crc { expected, got });
    }

    let word = |offset: usize| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    };
    let magic = word(0);
    if magic != POWER_MAGIC {
        return Err(PowerError::Magic(magic));
    }
    Ok(word(8))
}

/// Ground-station handshake and request decoding
#[derive(Debug, Default)]
pub struct PowerControl {
    connected: bool,
    last_connect: Option<Instant>,
}

impl PowerControl {
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// True when a CONNECT announcement is due
    pub fn connect_due(&mut self, now: Instant) -> bool {
        if self.connected {
            return false;
        }
        let due = self
            .last_connect
            .is_none_or(|last| now.saturating_duration_since(last) >= CONNECT_INTERVAL);
        if due {
            self.last_connect = Some(now);
        }
        due
    }

    pub fn handle(&mut self, buf: &[u8]) -> Result<PowerAction, PowerError> {
        let cmd = parse_packet(buf)?;
        self.connected = true;
        Ok(match cmd {
            CMD_REBOOT => PowerAction::Event(PowerEvent::RebootRequested),
            CMD_SHUTDOWN => PowerAction::Event(PowerEvent::ShutdownRequested),
            CMD_KEEPALIVE => PowerAction::Echo,
            _ => PowerAction::Ignore,
        })
    }
}
