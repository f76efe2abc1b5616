// Message types the runtime publishes to the rest of the rover

use serde::{Deserialize, Serialize};

use crate::config::DRIVES_COUNT;
use crate::motor::ActuatorTelemetry;

/// Bump when the snapshot layout changes so readers can reject stale decoders
pub const TELEMETRY_VERSION: u32 = 1;

/// Drive engagement state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// Motors freewheel; drives only get keepalives
    #[default]
    Free,
    /// Mixer output is sent every cycle
    Drive,
}

/// Point-in-time copy of the motion state, overwritten every tick
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub version: u32,
    pub seq: u64,
    pub mode: DriveMode,
    pub connected: bool,
    /// Divisor for `drives[i].duty_fraction` under the active firmware dialect
    pub duty_divisor: f64,
    pub drives: [ActuatorTelemetry; DRIVES_COUNT],
}

/// Power action requested by the ground station; carrying it out is the supervisor's job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PowerEvent {
    RebootRequested,
    ShutdownRequested,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json() {
        let snapshot = TelemetrySnapshot {
            version: TELEMETRY_VERSION,
            seq: 3,
            mode: DriveMode::Drive,
            connected: true,
            duty_divisor: 1000.0,
            drives: [ActuatorTelemetry::default(); DRIVES_COUNT],
        };
        let json: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["mode"], "drive");
        assert_eq!(json["version"], 1);
        assert_eq!(json["drives"].as_array().unwrap().len(), DRIVES_COUNT);
        assert_eq!(json["drives"][0]["rpm"], 0);
    }

    #[test]
    fn test_power_event_json() {
        let json = serde_json::to_string(&PowerEvent::ShutdownRequested).unwrap();
        assert_eq!(json, "\"shutdown_requested\"");
    }
}
