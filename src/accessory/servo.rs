// Pan/tilt camera head on a serial servo controller
//
// Frame format: [0xA5, pan, tilt, light, checksum]
// checksum = sum of the first four bytes, mod 256
//
// Writes happen inside the control tick. A frame is 5 bytes (~0.5 ms at 115200
// baud) and the port write timeout is WRITE_TIMEOUT_MS, so one write costs at
// most that. After a failed write the link stays quiet for WEDGED_BACKOFF
// frames, so a wedged port costs one timeout per second, not one per tick.

use serialport::{self, SerialPort};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ServoLimits;
use crate::uplink::Pov;

const HEADER: u8 = 0xA5;
pub const SERVO_FRAME_LEN: usize = 5;

const WRITE_TIMEOUT_MS: u64 = 2;

/// Frames dropped after a failed write before the port is tried again
pub const WEDGED_BACKOFF: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ServoError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

pub fn build_frame(pan: u8, tilt: u8, light: u8) -> [u8; SERVO_FRAME_LEN] {
    let mut frame = [HEADER, pan, tilt, light, 0];
    frame[4] = checksum(&frame[..4]);
    frame
}

/// Pan/tilt angles in degrees, integrated from stick rates
#[derive(Debug, Clone)]
pub struct PanTilt {
    pan: f32,
    tilt: f32,
    limits: ServoLimits,
}

impl PanTilt {
    /// Starts centered in both ranges
    pub fn new(limits: ServoLimits) -> Self {
        Self {
            pan: (limits.pan_min + limits.pan_max) / 2.0,
            tilt: (limits.tilt_min + limits.tilt_max) / 2.0,
            limits,
        }
    }

    pub fn angles(&self) -> (f32, f32) {
        (self.pan, self.tilt)
    }

    /// Advance by one tick. A pressed hat snaps to a preset instead.
    pub fn update(&mut self, pan_rate: f32, tilt_rate: f32, pov: Pov) {
        let l = self.limits;
        match pov {
            Pov::Up => *self = Self::new(l),
            Pov::Down => self.tilt = l.tilt_min,
            Pov::Left => self.pan = l.pan_max,
            Pov::Right => self.pan = l.pan_min,
            Pov::Centered => {
                self.pan = (self.pan + pan_rate * l.rate).clamp(l.pan_min, l.pan_max);
                self.tilt = (self.tilt + tilt_rate * l.rate).clamp(l.tilt_min, l.tilt_max);
            }
        }
    }

    pub fn frame(&self, light: u8) -> [u8; SERVO_FRAME_LEN] {
        let to_byte = |deg: f32| deg.round().clamp(0.0, 255.0) as u8;
        build_frame(to_byte(self.pan), to_byte(self.tilt), light)
    }
}

/// Write side of the servo controller's serial link
pub struct ServoLink {
    port: Box<dyn Write + Send>,
    backoff: u32,
}

impl ServoLink {
    /// Open the serial port
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self, ServoError> {
        let port: Box<dyn SerialPort> = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(WRITE_TIMEOUT_MS))
            .open()?;
        info!("Opened servo controller on {} @ {}", port_name, baudrate);
        Ok(Self::from_writer(Box::new(port)))
    }

    /// Any byte sink, e.g. a pty or an in-memory buffer
    pub fn from_writer(port: Box<dyn Write + Send>) -> Self {
        Self { port, backoff: 0 }
    }

    /// Write one frame. While backing off after a failure the frame is dropped.
    pub fn send(&mut self, frame: &[u8; SERVO_FRAME_LEN]) -> Result<(), ServoError> {
        if self.backoff > 0 {
            self.backoff -= 1;
            return Ok(());
        }
        debug!("Servo frame: {:02X?}", frame);
        let written = self.port.write_all(frame).and_then(|()| self.port.flush());
        if written.is_err() {
            self.backoff = WEDGED_BACKOFF;
        }
        written.map_err(ServoError::from)
    }
}
