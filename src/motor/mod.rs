// Motor control module for the six-wheel drive train
//
// Provides:
// - Drive controller CAN protocol (status decoding, command encoding)
// - Per-drive telemetry store fed by status frames
// - Skid-steer mixer with traction control
// - High-level motor driver API

mod driver;
pub mod mixer;
pub mod telemetry;
pub mod vesc;

pub use driver::MotorDriver;
pub use mixer::{Mixer, SideSpeeds, TractionControl, apply_deadzone, tank_mix};
pub use telemetry::{ActuatorTelemetry, DriveTelemetry, FrameOutcome};
pub use vesc::{Command, StatusRecord, decode_fixed, decode_i16, decode_i32, encode_i32};
