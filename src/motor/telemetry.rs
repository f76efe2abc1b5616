// Per-drive telemetry and the status-frame state machine that feeds it

use serde::Serialize;
use tracing::{debug, info, warn};

use super::vesc::{Command, StatusRecord};
use crate::can::CanFrame;
use crate::config::DRIVES_COUNT;

/// Last reported state of one drive controller, in the controller's fixed-point units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActuatorTelemetry {
    pub rpm: i32,
    pub current_deci_amp: i16,
    /// Scale is per firmware dialect, see `FirmwareDialect::duty_divisor`
    pub duty_fraction: i16,
    pub ah_consumed: i32,
    pub ah_charged: i32,
    pub wh_consumed: i32,
    pub wh_charged: i32,
    pub temp_fet_deci_c: i16,
    pub temp_motor_deci_c: i16,
    pub current_in_deci_amp: i16,
    pub pid_pos_x50: i16,
    pub tacho: i32,
    pub voltage_in_deci_volt: i16,
}

impl ActuatorTelemetry {
    fn apply(&mut self, record: StatusRecord) {
        match record {
            StatusRecord::Status {
                rpm,
                current_x10,
                duty,
            } => {
                self.rpm = rpm;
                self.current_deci_amp = current_x10;
                self.duty_fraction = duty;
            }
            StatusRecord::Status2 {
                ah_x10000,
                ah_charged_x10000,
            } => {
                self.ah_consumed = ah_x10000;
                self.ah_charged = ah_charged_x10000;
            }
            StatusRecord::Status3 {
                wh_x10000,
                wh_charged_x10000,
            } => {
                self.wh_consumed = wh_x10000;
                self.wh_charged = wh_charged_x10000;
            }
            StatusRecord::Status4 {
                temp_fet_x10,
                temp_motor_x10,
                current_in_x10,
                pid_pos_x50,
            } => {
                self.temp_fet_deci_c = temp_fet_x10;
                self.temp_motor_deci_c = temp_motor_x10;
                self.current_in_deci_amp = current_in_x10;
                self.pid_pos_x50 = pid_pos_x50;
            }
            StatusRecord::Status5 { tacho, v_in_x10 } => {
                self.tacho = tacho;
                self.voltage_in_deci_volt = v_in_x10;
            }
        }
    }

    pub fn duty(&self, divisor: f64) -> f64 {
        f64::from(self.duty_fraction) / divisor
    }

    pub fn current_amps(&self) -> f64 {
        f64::from(self.current_deci_amp) / 10.0
    }

    pub fn voltage_in(&self) -> f64 {
        f64::from(self.voltage_in_deci_volt) / 10.0
    }
}

/// What happened to one received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Status record written into the drive's telemetry
    Updated(Command),
    /// Keepalive reply addressed to us
    Pong,
    /// Node id outside the drive range, dropped
    UnknownNode,
    /// Payload too short for its record, dropped
    Short,
    /// Tag we do not handle
    Ignored,
}

/// Telemetry store for all drives, written only by [`DriveTelemetry::handle_frame`]
#[derive(Debug, Clone)]
pub struct DriveTelemetry {
    drives: [ActuatorTelemetry; DRIVES_COUNT],
    duty_divisor: f64,
}

impl DriveTelemetry {
    pub fn new(duty_divisor: f64) -> Self {
        Self {
            drives: [ActuatorTelemetry::default(); DRIVES_COUNT],
            duty_divisor,
        }
    }

    pub fn drives(&self) -> &[ActuatorTelemetry; DRIVES_COUNT] {
        &self.drives
    }

    pub fn get(&self, id: usize) -> Option<&ActuatorTelemetry> {
        self.drives.get(id)
    }

    /// Current rpm of every drive, indexed by node id
    pub fn rpms(&self) -> [i32; DRIVES_COUNT] {
        self.drives.map(|d| d.rpm)
    }

    /// Classify one frame and update the addressed drive
    pub fn handle_frame(&mut self, frame: &CanFrame) -> FrameOutcome {
        let id = frame.actuator_id as usize;

        if id >= DRIVES_COUNT {
            // Pong replies come back to our own (out of range) id
            if frame.command == Command::Pong as u8 {
                return FrameOutcome::Pong;
            }
            warn!(
                "Frame from unknown node: id={}, cmd={}, len={}",
                frame.actuator_id,
                frame.command,
                frame.len()
            );
            return FrameOutcome::UnknownNode;
        }

        match StatusRecord::decode(frame.command, frame.payload()) {
            Ok(Some(record)) => {
                self.log_record(id, &record);
                self.drives[id].apply(record);
                FrameOutcome::Updated(record.command())
            }
            Ok(None) => {
                info!(
                    "recv: from={:X}, cmd={:x}, data_len={}",
                    frame.actuator_id,
                    frame.command,
                    frame.len()
                );
                FrameOutcome::Ignored
            }
            Err(e) => {
                debug!("Drive {}: {}", id, e);
                FrameOutcome::Short
            }
        }
    }

    fn log_record(&self, id: usize, record: &StatusRecord) {
        match *record {
            StatusRecord::Status {
                rpm,
                current_x10,
                duty,
            } => debug!(
                "drive {}: rpm: {}, current: {:.1}, duty: {:.3}",
                id,
                rpm,
                f64::from(current_x10) / 10.0,
                f64::from(duty) / self.duty_divisor
            ),
            StatusRecord::Status2 {
                ah_x10000,
                ah_charged_x10000,
            } => debug!(
                "drive {}: consumed: {:.4} ah, charged: {:.4} ah",
                id,
                f64::from(ah_x10000) / 10000.0,
                f64::from(ah_charged_x10000) / 10000.0
            ),
            StatusRecord::Status3 {
                wh_x10000,
                wh_charged_x10000,
            } => debug!(
                "drive {}: consumed: {:.4} wh, charged: {:.4} wh",
                id,
                f64::from(wh_x10000) / 10000.0,
                f64::from(wh_charged_x10000) / 10000.0
            ),
            StatusRecord::Status4 {
                temp_fet_x10,
                temp_motor_x10,
                current_in_x10,
                pid_pos_x50,
            } => debug!(
                "drive {}: temp_fet: {:.1}, temp_motor: {:.1}, current_in: {:.1}, pid_pos: {:.2}",
                id,
                f64::from(temp_fet_x10) / 10.0,
                f64::from(temp_motor_x10) / 10.0,
                f64::from(current_in_x10) / 10.0,
                f64::from(pid_pos_x50) / 50.0
            ),
            StatusRecord::Status5 { tacho, v_in_x10 } => debug!(
                "drive {}: tacho: {}, v_in: {:.1}",
                id,
                tacho,
                f64::from(v_in_x10) / 10.0
            ),
        }
    }
}
