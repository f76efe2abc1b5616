// High-level driver for the six drive controllers
//
// Wraps a CAN transport with the handful of broadcasts the motion loop needs.
// Sends are best effort: a failed frame is logged and the cycle goes on.

use tracing::{debug, info, warn};

use super::telemetry::{DriveTelemetry, FrameOutcome};
use super::vesc;
use crate::can::{CanFrame, CanTransport, Received};
use crate::config::DRIVES_COUNT;

pub struct MotorDriver<B: CanTransport> {
    bus: B,
    host_id: u8,
    send_failures: u64,
}

impl<B: CanTransport> MotorDriver<B> {
    /// `host_id` is the node id drives address their PONG replies to
    pub fn new(bus: B, host_id: u8) -> Self {
        Self {
            bus,
            host_id,
            send_failures: 0,
        }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    /// Send one frame, logging (not propagating) failures
    pub fn send(&mut self, frame: &CanFrame) -> bool {
        match self.bus.send(frame) {
            Ok(()) => true,
            Err(e) => {
                self.send_failures += 1;
                warn!(
                    "Dropped frame to node {} (cmd {}): {}",
                    frame.actuator_id, frame.command, e
                );
                false
            }
        }
    }

    /// Drain pending frames into the telemetry store, at most `limit` reads per call.
    /// Skipped reads count against the limit too.
    pub fn drain(&mut self, telemetry: &mut DriveTelemetry, limit: usize) -> usize {
        let mut count = 0;
        while count < limit {
            let Some(received) = self.bus.try_recv() else {
                return count;
            };
            count += 1;
            let Received::Frame(frame) = received else {
                continue;
            };
            if let FrameOutcome::Updated(cmd) = telemetry.handle_frame(&frame) {
                debug!("drive {} updated by {:?}", frame.actuator_id, cmd);
            }
        }
        debug!("CAN drain hit the {} frame limit", limit);
        count
    }

    /// Zero current on every drive so the wheels freewheel
    pub fn disengage(&mut self) {
        info!("Disengaging all drives");
        for id in 0..DRIVES_COUNT as u8 {
            self.send(&vesc::set_current(id, 0.0));
        }
    }

    /// Ping every drive to keep its command watchdog fed
    pub fn keepalive(&mut self) {
        for id in 0..DRIVES_COUNT as u8 {
            self.send(&vesc::ping(id, self.host_id));
        }
    }

    /// Send one duty command per drive, indexed by node id
    pub fn set_duties(&mut self, duties: &[f32; DRIVES_COUNT]) {
        for (id, &duty) in duties.iter().enumerate() {
            self.send(&vesc::set_duty(id as u8, duty));
        }
    }
}

impl<B: CanTransport> Drop for MotorDriver<B> {
    fn drop(&mut self) {
        // Leave the wheels freewheeling rather than holding the last duty
        self.disengage();
    }
}
