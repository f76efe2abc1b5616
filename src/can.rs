// CAN transport for the drive controllers
//
// The drive controllers use 29-bit extended ids laid out as
// [reserved:16][command:8][node:8], which is the header every frame carries.

use std::io::ErrorKind;

use socketcan::{CanFrame as SocketFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket};
use tracing::{debug, info, warn};

/// Classic CAN payload limit
pub const MAX_PAYLOAD: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum CanError {
    #[error("Cannot open CAN interface {iface}: {source}")]
    Open {
        iface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CAN send failed: {0}")]
    Send(#[from] std::io::Error),

    #[error("CAN payload of {0} bytes exceeds {MAX_PAYLOAD}")]
    PayloadTooLong(usize),

    #[error("Invalid extended CAN id 0x{0:08X}")]
    InvalidId(u32),
}

/// One frame on the motor bus, addressed by node id and command tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub actuator_id: u8,
    pub command: u8,
    len: u8,
    data: [u8; MAX_PAYLOAD],
}

impl CanFrame {
    pub fn new(actuator_id: u8, command: u8, payload: &[u8]) -> Result<Self, CanError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(CanError::PayloadTooLong(payload.len()));
        }
        Ok(Self::fitted(actuator_id, command, payload))
    }

    /// Build from a payload known to fit; anything past 8 bytes is cut off
    pub(crate) fn fitted(actuator_id: u8, command: u8, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_PAYLOAD);
        let mut data = [0u8; MAX_PAYLOAD];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            actuator_id,
            command,
            len: len as u8,
            data,
        }
    }

    /// Split a raw extended id into node and command
    pub fn from_can_id(raw_id: u32, payload: &[u8]) -> Result<Self, CanError> {
        Self::new((raw_id & 0xFF) as u8, ((raw_id >> 8) & 0xFF) as u8, payload)
    }

    pub fn can_id(&self) -> u32 {
        (u32::from(self.command) << 8) | u32::from(self.actuator_id)
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One read off the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Frame(CanFrame),
    /// Remote, error or malformed frame; read and discarded
    Skipped,
}

/// Non-blocking access to the motor bus
pub trait CanTransport {
    /// Next pending read, `None` once the receive queue is empty.
    /// Reads exactly one frame per call so callers can bound a drain.
    fn try_recv(&mut self) -> Option<Received>;

    fn send(&mut self, frame: &CanFrame) -> Result<(), CanError>;
}

/// SocketCAN-backed bus
pub struct CanBus {
    socket: CanSocket,
    iface: String,
}

impl CanBus {
    /// Open the interface in non-blocking mode
    pub fn open(iface: &str) -> Result<Self, CanError> {
        let open = || -> std::io::Result<CanSocket> {
            let socket = CanSocket::open(iface)?;
            socket.set_nonblocking(true)?;
            Ok(socket)
        };
        let socket = open().map_err(|source| CanError::Open {
            iface: iface.to_string(),
            source,
        })?;
        info!("Opened CAN interface {}", iface);

        Ok(Self {
            socket,
            iface: iface.to_string(),
        })
    }
}

impl CanTransport for CanBus {
    fn try_recv(&mut self) -> Option<Received> {
        match self.socket.read_frame() {
            Ok(SocketFrame::Data(frame)) => {
                let raw_id = match frame.id() {
                    Id::Extended(id) => id.as_raw(),
                    Id::Standard(id) => u32::from(id.as_raw()),
                };
                match CanFrame::from_can_id(raw_id, frame.data()) {
                    Ok(frame) => Some(Received::Frame(frame)),
                    Err(e) => {
                        debug!("Dropping CAN frame: {}", e);
                        Some(Received::Skipped)
                    }
                }
            }
            Ok(SocketFrame::Remote(_)) => Some(Received::Skipped),
            Ok(SocketFrame::Error(frame)) => {
                debug!("CAN error frame: {:?}", frame);
                Some(Received::Skipped)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("CAN receive failed on {}: {}", self.iface, e);
                None
            }
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), CanError> {
        let id = ExtendedId::new(frame.can_id()).ok_or(CanError::InvalidId(frame.can_id()))?;
        let out = SocketFrame::new(id, frame.payload()).ok_or(CanError::PayloadTooLong(frame.len()))?;
        self.socket.write_frame(&out)?;
        Ok(())
    }
}

/// In-memory bus for tests: queued frames come out of `try_recv`, sends are recorded
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MockBus {
    pub rx: std::collections::VecDeque<Received>,
    pub sent: Vec<CanFrame>,
    pub fail_sends: bool,
}

#[cfg(test)]
impl MockBus {
    pub fn push_rx(&mut self, frame: CanFrame) {
        self.rx.push_back(Received::Frame(frame));
    }

    /// Queue a read that carries no usable frame (RTR, error frame)
    pub fn push_skipped(&mut self) {
        self.rx.push_back(Received::Skipped);
    }

    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        std::mem::take(&mut self.sent)
    }
}

#[cfg(test)]
impl CanTransport for MockBus {
    fn try_recv(&mut self) -> Option<Received> {
        self.rx.pop_front()
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), CanError> {
        if self.fail_sends {
            return Err(CanError::Send(std::io::Error::new(
                ErrorKind::Other,
                "bus off",
            )));
        }
        self.sent.push(*frame);
        Ok(())
    }
}
