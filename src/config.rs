// Timeouts, topics, ports and per-deployment tuning
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

// Runtime loop frequency (50 ms tick)
pub const LOOP_HZ: u64 = 20;

// Uplink watchdog: forces failsafe neutral after this much silence
pub const UPLINK_TIMEOUT: Duration = Duration::from_millis(500);

// Keepalive cadence while the drives are freewheeling
pub const KEEPALIVE_PERIOD: Duration = Duration::from_millis(50);

// Number of drive actuators on the bus
pub const DRIVES_COUNT: usize = 6;

// Upper bound on frames/datagrams drained per tick, keeps a flood from starving the loop
pub const MAX_CAN_DRAIN: usize = 256;
pub const MAX_UPLINK_DRAIN: usize = 64;
pub const MAX_POWER_DRAIN: usize = 16;

// Zenoh topics
pub const TOPIC_MOTION_STATUS: &str = "rover/motion/status"; // telemetry snapshot
pub const TOPIC_POWER_REQUEST: &str = "rover/power/request"; // reboot/shutdown events

// Network defaults
pub const CAN_INTERFACE: &str = "can0";
pub const UPLINK_PORT: u16 = 5565;
pub const POWER_PORT: u16 = 5011;
pub const GROUND_STATION: &str = "192.168.50.100:5011";

// Pan/tilt servo controller
pub const SERVO_PORT: &str = "/dev/ttyS1";
pub const SERVO_BAUDRATE: u32 = 115_200;

// CAN id we present as when pinging the drives; pong replies come back here
pub const HOST_CAN_ID: u8 = 0xFE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown firmware dialect '{0}' (expected legacy, v5 or v6)")]
    UnknownDialect(String),

    #[error("Invalid ground station address: {0}")]
    Address(#[from] std::net::AddrParseError),
}

/// Firmware variant of the drive controllers.
///
/// Dialects disagree on the fixed-point scale of the reported duty cycle and on
/// which optional peripherals are fitted. Mixing scales silently corrupts
/// telemetry, so the dialect is picked once per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FirmwareDialect {
    /// Divisor applied to the STATUS duty field (10, 100 or 1000)
    pub duty_divisor: f64,
    pub traction_control: bool,
    pub lights: bool,
    pub servo: bool,
}

impl FirmwareDialect {
    /// Early firmware: duty reported ×10, bare drives only
    pub const LEGACY: Self = Self {
        duty_divisor: 10.0,
        traction_control: false,
        lights: false,
        servo: false,
    };

    /// Duty ×100, traction control and lights
    pub const V5: Self = Self {
        duty_divisor: 100.0,
        traction_control: true,
        lights: true,
        servo: false,
    };

    /// Duty ×1000, everything fitted
    pub const V6: Self = Self {
        duty_divisor: 1000.0,
        traction_control: true,
        lights: true,
        servo: true,
    };

    pub fn by_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::LEGACY),
            "v5" => Ok(Self::V5),
            "v6" => Ok(Self::V6),
            _ => Err(ConfigError::UnknownDialect(name.to_string())),
        }
    }
}

impl Default for FirmwareDialect {
    fn default() -> Self {
        Self::V6
    }
}

/// Tunable constants of the mixer and traction-control loop
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TractionTuning {
    /// Axis values at or below this magnitude are treated as zero
    pub deadzone: f32,
    /// Below this |speed| the mix blends into a pivot turn
    pub pivot_limit: f32,
    /// Per-cycle change of a wheel scale factor
    pub step: f32,
    /// Side-min / own-rpm ratio under which a wheel counts as slipping
    pub slip_ratio: f32,
    /// |rpm| under which a wheel is considered at rest
    pub rpm_floor: f32,
}

impl Default for TractionTuning {
    fn default() -> Self {
        Self {
            deadzone: 0.05,
            pivot_limit: 0.25,
            step: 0.05,
            slip_ratio: 0.9,
            rpm_floor: 5.0,
        }
    }
}

/// Angle limits (degrees) and rates of the pan/tilt head
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServoLimits {
    pub pan_min: f32,
    pub pan_max: f32,
    pub tilt_min: f32,
    pub tilt_max: f32,
    /// Degrees per tick at full aux-axis deflection
    pub rate: f32,
}

impl Default for ServoLimits {
    fn default() -> Self {
        Self {
            pan_min: 0.0,
            pan_max: 180.0,
            tilt_min: 30.0,
            tilt_max: 150.0,
            rate: 4.0,
        }
    }
}

/// Full deployment configuration, usually loaded from a JSON file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub can_interface: String,
    pub uplink_port: u16,
    pub power_port: u16,
    pub ground_station: String,
    pub servo_port: String,
    pub servo_baudrate: u32,
    pub host_can_id: u8,
    pub uplink_timeout_ms: u64,
    pub keepalive_period_ms: u64,
    pub dialect: FirmwareDialect,
    pub traction: TractionTuning,
    pub servo_limits: ServoLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            can_interface: CAN_INTERFACE.to_string(),
            uplink_port: UPLINK_PORT,
            power_port: POWER_PORT,
            ground_station: GROUND_STATION.to_string(),
            servo_port: SERVO_PORT.to_string(),
            servo_baudrate: SERVO_BAUDRATE,
            host_can_id: HOST_CAN_ID,
            uplink_timeout_ms: UPLINK_TIMEOUT.as_millis() as u64,
            keepalive_period_ms: KEEPALIVE_PERIOD.as_millis() as u64,
            dialect: FirmwareDialect::default(),
            traction: TractionTuning::default(),
            servo_limits: ServoLimits::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load a JSON config file; missing keys fall back to the defaults above
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn uplink_timeout(&self) -> Duration {
        Duration::from_millis(self.uplink_timeout_ms)
    }

    pub fn keepalive_period(&self) -> Duration {
        Duration::from_millis(self.keepalive_period_ms)
    }

    pub fn ground_station_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(self.ground_station.parse()?)
    }
}
